use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use crate::{
    api,
    clients::{LineConfig, LinePushNotifier, Notifier, StdoutNotifier},
    config::Config,
    observability::Telemetry,
    service::DigestService,
    settings::DigestSettings,
    sources::{
        CombinedTrendSource, JsonFileItemSource, JsonFileTrendSource, StaticTrendSource,
        TrendSource,
    },
    store::{FileKvStore, KvStore},
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    service: Arc<DigestService>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        self.registry.service.telemetry()
    }

    pub(crate) fn service(&self) -> Arc<DigestService> {
        Arc::clone(&self.registry.service)
    }
}

impl ComponentRegistry {
    /// 構成情報からダイジェストサービスと依存をまとめて初期化する。
    ///
    /// # Errors
    /// Telemetry の初期化、ダイジェスト設定の読み込み、HTTP クライアント構築が失敗した場合はエラーを返す。
    pub fn build(config: &Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        let settings = Arc::new(
            DigestSettings::load(config.config_path())
                .context("failed to load digest configuration")?,
        );

        let store: Arc<dyn KvStore> = Arc::new(FileKvStore::new(config.state_dir()));
        let notifier: Arc<dyn Notifier> = match config.line_channel_access_token() {
            Some(token) => Arc::new(LinePushNotifier::new(LineConfig {
                base_url: config.line_api_base_url().to_string(),
                access_token: token.to_string(),
                timeout: config.line_push_timeout(),
            })?),
            None => {
                info!("no push token configured, digests go to stdout");
                Arc::new(StdoutNotifier)
            }
        };

        let items = Arc::new(JsonFileItemSource::new(
            config.items_path(),
            settings.digest.lookback_hours,
        ));
        let mut trend_sources: Vec<Box<dyn TrendSource>> =
            vec![Box::new(StaticTrendSource::new(settings.radar.clone()))];
        if let Some(path) = config.trends_path() {
            trend_sources.push(Box::new(JsonFileTrendSource::new(path)));
        }
        let trends = Arc::new(CombinedTrendSource::new(trend_sources));

        let service = DigestService::new(settings, items, trends, store, notifier, telemetry)
            .with_store_retry(
                config.store_max_retries(),
                config.store_backoff_base_ms(),
                config.store_backoff_cap_ms(),
            )
            .with_timezone(config.timezone());

        Ok(Self::new(service))
    }

    #[must_use]
    pub fn new(service: DigestService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    #[must_use]
    pub fn service(&self) -> Arc<DigestService> {
        Arc::clone(&self.service)
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}
