//! Watchlist persistence around the delay tracker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::watchlist::{DelayTracker, TrackerReport, WatchlistState};
use crate::pipeline::PickSet;
use crate::store::document::{load, update};
use crate::store::{KvStore, StoreError, WATCHLIST_KEY};
use crate::util::retry::RetryConfig;

/// Whether the watchlist was advanced this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackingStatus {
    Active { report: TrackerReport },
    /// Concurrent writers kept winning; the stored state is from an earlier run.
    Stale { reason: String },
    /// The store could not be used at all.
    Disabled { reason: String },
}

impl TrackingStatus {
    #[must_use]
    pub fn from_result(result: Result<TrackerReport, StoreError>) -> Self {
        match result {
            Ok(report) => Self::Active { report },
            Err(err) if err.is_conflict() => Self::Stale {
                reason: err.to_string(),
            },
            Err(err) => Self::Disabled {
                reason: format!("{:#}", anyhow::Error::new(err)),
            },
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

#[derive(Clone)]
pub struct WatchlistTracking {
    store: Arc<dyn KvStore>,
    tracker: DelayTracker,
    retry: RetryConfig,
}

impl WatchlistTracking {
    pub(crate) fn new(store: Arc<dyn KvStore>, tracker: DelayTracker, retry: RetryConfig) -> Self {
        Self {
            store,
            tracker,
            retry,
        }
    }

    /// Runs one tracker step against the stored state.
    ///
    /// # Errors
    /// Propagates store failures, including conflicts that outlast the retries.
    pub async fn advance(
        &self,
        picks: &PickSet,
        trend_terms: &[String],
        now: DateTime<Utc>,
    ) -> Result<TrackerReport, StoreError> {
        let tracker = self.tracker;
        update(
            self.store.as_ref(),
            WATCHLIST_KEY,
            self.retry,
            |state: WatchlistState| tracker.advance(state, picks, trend_terms, now),
        )
        .await
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn snapshot(&self) -> Result<WatchlistState, StoreError> {
        let (state, _) = load(self.store.as_ref(), WATCHLIST_KEY).await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{CandidateItem, ScoredCandidate};
    use crate::pipeline::watchlist::WatchPolicy;
    use crate::store::MemoryKvStore;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn tracking(store: Arc<dyn KvStore>) -> WatchlistTracking {
        WatchlistTracking::new(
            store,
            DelayTracker::new(WatchPolicy::default()),
            RetryConfig::new(3, 1, 2),
        )
    }

    fn strong_pick(link: &str) -> PickSet {
        PickSet::new(vec![ScoredCandidate {
            topic_id: "semis".to_string(),
            topic_name: "Semis".to_string(),
            score: 4.0,
            item: Some(CandidateItem::new("TSMC plant", link, "", Utc::now())),
            base_hits: vec!["tsmc".to_string()],
            radar_hits: Vec::new(),
            is_fallback: false,
        }])
    }

    #[tokio::test]
    async fn enrolls_then_ferments_across_runs() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let tracking = tracking(Arc::clone(&store));
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

        let first = tracking
            .advance(&strong_pick("https://x.com/1"), &[], start)
            .await
            .unwrap();
        assert_eq!(first.enrolled, 1);

        let later = start + Duration::hours(49);
        let second = tracking
            .advance(&PickSet::default(), &["tsmc".to_string()], later)
            .await
            .unwrap();
        assert_eq!(second.fermented_links, vec!["https://x.com/1"]);

        let state = tracking.snapshot().await.unwrap();
        assert!(state.watching.is_empty());
        assert_eq!(state.done[0].fermented, Some(true));
    }

    #[tokio::test]
    async fn corrupt_document_disables_tracking() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        store
            .write(WATCHLIST_KEY, &json!({"watching": "nope"}), None)
            .await
            .unwrap();

        let result = tracking(store)
            .advance(&PickSet::default(), &[], Utc::now())
            .await;
        let status = TrackingStatus::from_result(result);
        assert!(matches!(status, TrackingStatus::Disabled { .. }));
    }

    #[test]
    fn conflict_maps_to_stale() {
        let status = TrackingStatus::from_result(Err(StoreError::Conflict {
            key: WATCHLIST_KEY.to_string(),
        }));
        assert!(matches!(status, TrackingStatus::Stale { .. }));
        assert!(!status.is_active());
    }
}
