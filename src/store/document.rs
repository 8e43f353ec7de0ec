//! Typed read-modify-write on top of [`KvStore`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::{KvStore, StoreError, VersionToken};
use crate::util::retry::RetryConfig;

/// Reads and decodes a document; an absent key yields `T::default()`.
pub(crate) async fn load<T>(
    store: &dyn KvStore,
    key: &str,
) -> Result<(T, Option<VersionToken>), StoreError>
where
    T: DeserializeOwned + Default,
{
    let Some(versioned) = store.read(key).await? else {
        return Ok((T::default(), None));
    };
    let value = serde_json::from_value(versioned.value).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })?;
    Ok((value, Some(versioned.version)))
}

/// Applies `apply` to the current document and writes the result back.
///
/// On a version conflict the document is re-read and `apply` runs again, up to
/// `retry.max_attempts` attempts in total with full-jitter backoff between
/// them. Other errors are returned immediately.
pub(crate) async fn update<T, R, F>(
    store: &dyn KvStore,
    key: &str,
    retry: RetryConfig,
    mut apply: F,
) -> Result<R, StoreError>
where
    T: DeserializeOwned + Serialize + Default + Send,
    R: Send,
    F: FnMut(T) -> (T, R) + Send,
{
    let mut attempt = 0;
    loop {
        let delay = retry.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (current, version) = load::<T>(store, key).await?;
        let (next, result) = apply(current);
        let value = serde_json::to_value(&next).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;

        match store.write(key, &value, version.as_ref()).await {
            Ok(_) => return Ok(result),
            Err(err) if err.is_conflict() && retry.can_retry(attempt + 1) => {
                attempt += 1;
                warn!(key, attempt, "version conflict, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::store::{MemoryKvStore, Versioned};

    /// Fails the first `conflicts` writes as if another writer got there first.
    struct ContendedStore {
        inner: MemoryKvStore,
        conflicts: AtomicUsize,
    }

    #[async_trait]
    impl KvStore for ContendedStore {
        async fn read(&self, key: &str) -> Result<Option<Versioned<Value>>, StoreError> {
            self.inner.read(key).await
        }

        async fn write(
            &self,
            key: &str,
            value: &Value,
            expected: Option<&VersionToken>,
        ) -> Result<VersionToken, StoreError> {
            if self.conflicts.load(Ordering::SeqCst) > 0 {
                self.conflicts.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                });
            }
            self.inner.write(key, value, expected).await
        }
    }

    fn fast_retry(max_attempts: usize) -> RetryConfig {
        RetryConfig::new(max_attempts, 1, 2)
    }

    #[tokio::test]
    async fn load_defaults_when_absent() {
        let store = MemoryKvStore::new();
        let (value, version): (Vec<String>, _) = load(&store, "users").await.unwrap();
        assert!(value.is_empty());
        assert!(version.is_none());
    }

    #[tokio::test]
    async fn load_rejects_wrong_shape() {
        let store = MemoryKvStore::new();
        store.write("users", &json!({"not": "a list"}), None).await.unwrap();
        let err = load::<Vec<String>>(&store, "users").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn update_retries_conflicts_and_reapplies() {
        let store = ContendedStore {
            inner: MemoryKvStore::new(),
            conflicts: AtomicUsize::new(2),
        };
        let mut calls = 0;

        let len = update(&store, "users", fast_retry(3), |mut users: Vec<String>| {
            calls += 1;
            users.push("U1".to_string());
            let len = users.len();
            (users, len)
        })
        .await
        .unwrap();

        assert_eq!(len, 1);
        assert_eq!(calls, 3);
        let (users, _): (Vec<String>, _) = load(&store, "users").await.unwrap();
        assert_eq!(users, vec!["U1"]);
    }

    #[tokio::test]
    async fn update_gives_up_after_max_attempts() {
        let store = ContendedStore {
            inner: MemoryKvStore::new(),
            conflicts: AtomicUsize::new(10),
        };
        let err = update(&store, "users", fast_retry(3), |users: Vec<String>| (users, ()))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
