//! Subscriber list kept as one versioned document.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::document::{load, update};
use crate::store::{KvStore, SUBSCRIBERS_KEY, StoreError};
use crate::util::retry::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub added_at: DateTime<Utc>,
    /// Failed pushes since the last successful one.
    #[serde(default)]
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberList {
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
}

/// Result of applying one round of push outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub removed: Vec<String>,
    pub remaining: usize,
}

#[derive(Clone)]
pub struct SubscriberBook {
    store: Arc<dyn KvStore>,
    retry: RetryConfig,
}

impl SubscriberBook {
    pub(crate) fn new(store: Arc<dyn KvStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn list(&self) -> Result<Vec<Subscriber>, StoreError> {
        let (list, _) = load::<SubscriberList>(self.store.as_ref(), SUBSCRIBERS_KEY).await?;
        Ok(list.subscribers)
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list().await?.len())
    }

    /// Adds one subscriber; returns `false` when it was already known.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn add(&self, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let added = self.add_many(&[id.to_string()], now).await?;
        Ok(!added.is_empty())
    }

    /// Adds every unknown, non-blank id and returns the newly added ones in order.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn add_many(
        &self,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let candidates: Vec<String> = ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let added = update(
            self.store.as_ref(),
            SUBSCRIBERS_KEY,
            self.retry,
            |mut list: SubscriberList| {
                let mut known: HashSet<String> =
                    list.subscribers.iter().map(|s| s.id.clone()).collect();
                let mut added = Vec::new();
                for id in &candidates {
                    if known.insert(id.clone()) {
                        list.subscribers.push(Subscriber {
                            id: id.clone(),
                            added_at: now,
                            consecutive_failures: 0,
                        });
                        added.push(id.clone());
                    }
                }
                (list, added)
            },
        )
        .await?;

        if !added.is_empty() {
            info!(added = added.len(), "subscribers added");
        }
        Ok(added)
    }

    /// Resets the failure count of every successful recipient and increments it
    /// for every failed one. Subscribers reaching `threshold` failures are removed.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn record_outcomes(
        &self,
        outcomes: &[(String, bool)],
        threshold: u32,
    ) -> Result<OutcomeSummary, StoreError> {
        let results: HashMap<&str, bool> = outcomes
            .iter()
            .map(|(id, ok)| (id.as_str(), *ok))
            .collect();

        let summary = update(
            self.store.as_ref(),
            SUBSCRIBERS_KEY,
            self.retry,
            |list: SubscriberList| {
                let mut summary = OutcomeSummary::default();
                let mut kept = Vec::with_capacity(list.subscribers.len());
                for mut subscriber in list.subscribers {
                    match results.get(subscriber.id.as_str()) {
                        Some(true) => {
                            subscriber.consecutive_failures = 0;
                            summary.succeeded += 1;
                        }
                        Some(false) => {
                            subscriber.consecutive_failures += 1;
                            summary.failed += 1;
                        }
                        None => {}
                    }
                    if subscriber.consecutive_failures >= threshold {
                        summary.removed.push(subscriber.id);
                    } else {
                        kept.push(subscriber);
                    }
                }
                summary.remaining = kept.len();
                (SubscriberList { subscribers: kept }, summary)
            },
        )
        .await?;

        if !summary.removed.is_empty() {
            info!(removed = ?summary.removed, "subscribers dropped after repeated failures");
        }
        Ok(summary)
    }
}
