//! In-process store, used by tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{KvStore, StoreError, VersionToken, Versioned, validate_key};

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    documents: Mutex<HashMap<String, (Value, u64)>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn token(revision: u64) -> VersionToken {
    VersionToken::new(format!("rev-{revision}"))
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn read(&self, key: &str) -> Result<Option<Versioned<Value>>, StoreError> {
        validate_key(key)?;
        let documents = self.documents.lock().await;
        Ok(documents.get(key).map(|(value, revision)| Versioned {
            value: value.clone(),
            version: token(*revision),
        }))
    }

    async fn write(
        &self,
        key: &str,
        value: &Value,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError> {
        validate_key(key)?;
        let mut documents = self.documents.lock().await;
        let current = documents.get(key).map(|(_, revision)| token(*revision));
        if current.as_ref() != expected {
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }

        let revision = documents.get(key).map_or(1, |(_, revision)| revision + 1);
        documents.insert(key.to_string(), (value.clone(), revision));
        Ok(token(revision))
    }
}
