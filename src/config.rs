use std::{
    env,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::FixedOffset;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    config_path: PathBuf,
    items_path: PathBuf,
    trends_path: Option<PathBuf>,
    state_dir: PathBuf,
    http_bind: SocketAddr,
    line_channel_access_token: Option<String>,
    line_api_base_url: String,
    line_push_timeout: Duration,
    store_max_retries: usize,
    store_backoff_base_ms: u64,
    store_backoff_cap_ms: u64,
    timezone: FixedOffset,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数からワーカーの実行時設定を読み込み、検証する。
    ///
    /// # Errors
    /// `DIGEST_ITEMS_PATH` が未設定、もしくは各種値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let config_path = PathBuf::from(env_or("DIGEST_CONFIG_PATH", "config.yml"));
        let items_path = PathBuf::from(env_var("DIGEST_ITEMS_PATH")?);
        let trends_path = optional_env("DIGEST_TRENDS_PATH").map(PathBuf::from);
        let state_dir = PathBuf::from(env_or("DIGEST_STATE_DIR", "data"));
        let http_bind = parse_socket_addr("DIGEST_HTTP_BIND", "0.0.0.0:9010")?;

        // push送信
        let line_channel_access_token = optional_env("LINE_CHANNEL_ACCESS_TOKEN");
        let line_api_base_url = env_or("LINE_API_BASE_URL", "https://api.line.me/");
        let line_push_timeout = parse_duration_ms("LINE_PUSH_TIMEOUT_MS", 30_000)?;

        // 楽観的書き込みの再試行(指数バックオフ+ジッター)
        let store_max_retries = parse_usize("STORE_MAX_RETRIES", 3)?;
        if store_max_retries == 0 {
            return Err(ConfigError::Invalid {
                name: "STORE_MAX_RETRIES",
                source: anyhow::anyhow!("must be greater than zero"),
            });
        }
        let store_backoff_base_ms = parse_u64("STORE_BACKOFF_BASE_MS", 100)?;
        let store_backoff_cap_ms = parse_u64("STORE_BACKOFF_CAP_MS", 2000)?;

        let timezone = parse_offset_hours("DIGEST_TIMEZONE_OFFSET_HOURS", 8)?;

        Ok(Self {
            config_path,
            items_path,
            trends_path,
            state_dir,
            http_bind,
            line_channel_access_token,
            line_api_base_url,
            line_push_timeout,
            store_max_retries,
            store_backoff_base_ms,
            store_backoff_cap_ms,
            timezone,
        })
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    #[must_use]
    pub fn items_path(&self) -> &Path {
        &self.items_path
    }

    #[must_use]
    pub fn trends_path(&self) -> Option<&Path> {
        self.trends_path.as_deref()
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn line_channel_access_token(&self) -> Option<&str> {
        self.line_channel_access_token.as_deref()
    }

    #[must_use]
    pub fn line_api_base_url(&self) -> &str {
        &self.line_api_base_url
    }

    #[must_use]
    pub fn line_push_timeout(&self) -> Duration {
        self.line_push_timeout
    }

    #[must_use]
    pub fn store_max_retries(&self) -> usize {
        self.store_max_retries
    }

    #[must_use]
    pub fn store_backoff_base_ms(&self) -> u64 {
        self.store_backoff_base_ms
    }

    #[must_use]
    pub fn store_backoff_cap_ms(&self) -> u64 {
        self.store_backoff_cap_ms
    }

    /// ダイジェストの日付を決めるタイムゾーンのオフセット。
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    optional_env(name).ok_or(ConfigError::Missing(name))
}

/// 未設定と空文字は同じ扱いにする。
fn optional_env(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn env_or(name: &'static str, default: &str) -> String {
    optional_env(name).unwrap_or_else(|| default.to_string())
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env_or(name, default);

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(ms))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env_or(name, &default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env_or(name, &default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_offset_hours(name: &'static str, default: i32) -> Result<FixedOffset, ConfigError> {
    let raw = env_or(name, &default.to_string());
    let hours = raw.parse::<i32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    if !(-12..=14).contains(&hours) {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("offset must be between -12 and 14 hours, got {hours}"),
        });
    }
    FixedOffset::east_opt(hours * 3600).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("offset out of range: {hours}"),
    })
}
