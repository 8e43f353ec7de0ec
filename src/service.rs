//! Orchestrates one digest run: inputs, selection, delivery and bookkeeping.

pub mod delivery;
pub mod subscribers;
pub mod tracking;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::Notifier;
use crate::observability::Telemetry;
use crate::pipeline::watchlist::DelayTracker;
use crate::pipeline::{
    Allocation, AllocationStats, Audience, CandidateItem, PickSet, TrendTerms, allocate,
    format_digest,
};
use crate::settings::DigestSettings;
use crate::sources::{ItemSource, TrendSource};
use crate::store::KvStore;
use crate::util::error::classify_error;
use crate::util::retry::RetryConfig;

pub use self::delivery::{DeliveryOutcome, DeliveryReport, deliver};
pub use self::subscribers::{OutcomeSummary, Subscriber, SubscriberBook};
pub use self::tracking::{TrackingStatus, WatchlistTracking};

/// Inputs and selection result for one point in time.
#[derive(Debug, Clone)]
pub struct Composition {
    pub items: Vec<CandidateItem>,
    pub trends: TrendTerms,
    pub allocation: Allocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub items_considered: usize,
    pub picks: PickSet,
    pub stats: AllocationStats,
    pub delivery: DeliveryReport,
    /// `None` when the subscriber list could not be updated after delivery.
    pub bookkeeping: Option<OutcomeSummary>,
    pub tracking: TrackingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WelcomeReport {
    pub users: usize,
    pub updated: usize,
    pub pushed: usize,
    pub push_failed: usize,
}

pub struct DigestService {
    settings: Arc<DigestSettings>,
    items: Arc<dyn ItemSource>,
    trends: Arc<dyn TrendSource>,
    store: Arc<dyn KvStore>,
    notifier: Arc<dyn Notifier>,
    telemetry: Telemetry,
    retry: RetryConfig,
    timezone: FixedOffset,
}

impl DigestService {
    #[must_use]
    pub fn new(
        settings: Arc<DigestSettings>,
        items: Arc<dyn ItemSource>,
        trends: Arc<dyn TrendSource>,
        store: Arc<dyn KvStore>,
        notifier: Arc<dyn Notifier>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            settings,
            items,
            trends,
            store,
            notifier,
            telemetry,
            retry: RetryConfig::default(),
            timezone: Utc.fix(),
        }
    }

    /// Bounds the optimistic read-modify-write loop on the store.
    #[must_use]
    pub fn with_store_retry(mut self, max_attempts: usize, base_ms: u64, cap_ms: u64) -> Self {
        self.retry = RetryConfig::new(max_attempts, base_ms, cap_ms);
        self
    }

    /// Offset used to pick the digest date.
    #[must_use]
    pub fn with_timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = timezone;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &DigestSettings {
        &self.settings
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn subscribers(&self) -> SubscriberBook {
        SubscriberBook::new(Arc::clone(&self.store), self.retry)
    }

    #[must_use]
    pub fn tracking(&self) -> WatchlistTracking {
        WatchlistTracking::new(
            Arc::clone(&self.store),
            DelayTracker::new(self.settings.watch),
            self.retry,
        )
    }

    fn digest_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Loads inputs and runs selection. A failing trend source only empties the radar.
    ///
    /// # Errors
    /// Returns an error when the candidate items cannot be loaded.
    pub async fn compose(&self, now: DateTime<Utc>) -> Result<Composition> {
        let items = self
            .items
            .fetch(now)
            .await
            .context("failed to load candidate items")?;
        let trends = match self.trends.fetch().await {
            Ok(trends) => trends,
            Err(error) => {
                warn!(error = ?error, "trend terms unavailable, scoring without radar");
                TrendTerms::default()
            }
        };

        let radar = trends.topic_map(&self.settings.topics);
        let allocation = allocate(
            &items,
            &self.settings.topics,
            self.settings.digest.allocation_params(),
            &radar,
        );
        info!(
            items = items.len(),
            picks = allocation.picks.len(),
            placeholders = allocation.stats.placeholders,
            fallback = allocation.stats.fallback_picks,
            "digest composed"
        );

        Ok(Composition {
            items,
            trends,
            allocation,
        })
    }

    /// Renders the digest without delivering it or touching stored state.
    ///
    /// # Errors
    /// Returns an error when the candidate items cannot be loaded.
    pub async fn preview(&self, now: DateTime<Utc>, audience: Audience) -> Result<String> {
        let composition = self.compose(now).await?;
        Ok(format_digest(
            &composition.allocation.picks,
            self.digest_date(now),
            audience,
            &self.settings.digest.format(),
        ))
    }

    /// Daily batch: compose, push to every subscriber, then update stored state.
    ///
    /// # Errors
    /// Returns an error when items or the subscriber list cannot be loaded.
    /// Watchlist failures are reported through [`RunReport::tracking`] instead.
    pub async fn run_daily(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let metrics = self.telemetry.metrics();
        let started = Instant::now();
        metrics.runs_total.inc();

        let result = self.run_daily_inner(now).await;

        metrics.run_duration.observe(started.elapsed().as_secs_f64());
        if let Err(error) = &result {
            metrics.runs_failed.inc();
            warn!(error = ?error, kind = ?classify_error(error), "digest run failed");
        }
        result
    }

    async fn run_daily_inner(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let run_id = Uuid::now_v7();
        let date = self.digest_date(now);
        info!(%run_id, %date, "digest run started");

        let metrics = self.telemetry.metrics();
        let Composition {
            items,
            trends,
            allocation,
        } = self.compose(now).await?;
        metrics.record_allocation(&allocation.stats);

        let text = format_digest(
            &allocation.picks,
            date,
            Audience::Daily,
            &self.settings.digest.format(),
        );

        let book = self.subscribers();
        let recipients: Vec<String> = book
            .list()
            .await
            .context("failed to read subscriber list")?
            .into_iter()
            .map(|subscriber| subscriber.id)
            .collect();

        let delivery = deliver(self.notifier.as_ref(), &recipients, &text).await;
        metrics.record_delivery(delivery.delivered(), delivery.failed());

        let bookkeeping = if delivery.outcomes.is_empty() {
            metrics.set_subscribers(0);
            Some(OutcomeSummary::default())
        } else {
            match book
                .record_outcomes(
                    &delivery.as_pairs(),
                    self.settings.delivery.unsubscribe_after_failures,
                )
                .await
            {
                Ok(summary) => {
                    metrics.record_bookkeeping(summary.remaining, summary.removed.len());
                    Some(summary)
                }
                Err(error) => {
                    if error.is_conflict() {
                        metrics.store_conflicts_total.inc();
                    }
                    warn!(key = error.key(), error = ?error, "subscriber bookkeeping skipped");
                    None
                }
            }
        };

        let tracking = TrackingStatus::from_result(
            self.tracking()
                .advance(&allocation.picks, &trends.all(), now)
                .await,
        );
        match &tracking {
            TrackingStatus::Active { report } => metrics.record_tracker(report),
            TrackingStatus::Stale { reason } => {
                metrics.store_conflicts_total.inc();
                warn!(%reason, "watchlist left stale");
            }
            TrackingStatus::Disabled { reason } => warn!(%reason, "watchlist tracking disabled"),
        }

        info!(
            %run_id,
            delivered = delivery.delivered(),
            failed = delivery.failed(),
            tracking_active = tracking.is_active(),
            "digest run finished"
        );

        Ok(RunReport {
            run_id,
            date,
            items_considered: items.len(),
            picks: allocation.picks,
            stats: allocation.stats,
            delivery,
            bookkeeping,
            tracking,
        })
    }

    /// Registers followers and pushes every one of them a welcome digest.
    ///
    /// Followers already on the list are pushed again (they re-followed) but
    /// are not counted as updated.
    ///
    /// # Errors
    /// Returns an error when the subscriber list cannot be updated.
    pub async fn welcome(&self, user_ids: &[String], now: DateTime<Utc>) -> Result<WelcomeReport> {
        let mut followers: Vec<String> = Vec::with_capacity(user_ids.len());
        for id in user_ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            if !followers.iter().any(|known| known == id) {
                followers.push(id.to_string());
            }
        }

        let book = self.subscribers();
        let added = book
            .add_many(&followers, now)
            .await
            .context("failed to register followers")?;
        let users = book.count().await.context("failed to count subscribers")?;
        self.telemetry.metrics().set_subscribers(users);

        let mut report = WelcomeReport {
            users,
            updated: added.len(),
            ..WelcomeReport::default()
        };
        if followers.is_empty() {
            return Ok(report);
        }

        match self.preview(now, Audience::Welcome).await {
            Ok(text) => {
                let delivery = deliver(self.notifier.as_ref(), &followers, &text).await;
                self.telemetry
                    .metrics()
                    .record_delivery(delivery.delivered(), delivery.failed());
                report.pushed = delivery.delivered();
                report.push_failed = delivery.failed();
            }
            Err(error) => {
                warn!(error = ?error, followers = followers.len(), "welcome digest unavailable");
                report.push_failed = followers.len();
            }
        }
        Ok(report)
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn subscriber_count(&self) -> Result<usize> {
        self.subscribers()
            .count()
            .await
            .context("failed to count subscribers")
    }
}
