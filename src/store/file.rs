//! Directory-backed store: one pretty-printed JSON file per key.
//!
//! The version token is the XXH3 hash of the file contents, so any external
//! edit also invalidates outstanding tokens. Writes go to a temporary file
//! which is then renamed over the document.

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::{KvStore, StoreError, VersionToken, Versioned, validate_key};
use crate::util::text::hash_text;

#[derive(Debug)]
pub struct FileKvStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKvStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(unavailable(
                key,
                anyhow::Error::new(err).context(format!("failed to read {}", path.display())),
            )),
        }
    }
}

fn token_for(raw: &str) -> VersionToken {
    VersionToken::new(format!("{:016x}", hash_text(raw)))
}

fn unavailable(key: &str, source: anyhow::Error) -> StoreError {
    StoreError::Unavailable {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn read(&self, key: &str) -> Result<Option<Versioned<Value>>, StoreError> {
        validate_key(key)?;
        let Some(raw) = self.read_raw(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(Versioned {
            value,
            version: token_for(&raw),
        }))
    }

    async fn write(
        &self,
        key: &str,
        value: &Value,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;

        let current = self.read_raw(key).await?.map(|raw| token_for(&raw));
        if current.as_ref() != expected {
            debug!(key, "version mismatch on write");
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }

        let raw = serde_json::to_string_pretty(value)
            .context("failed to serialize document")
            .map_err(|err| unavailable(key, err))?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create {}", self.root.display()))
            .map_err(|err| unavailable(key, err))?;

        let path = self.path_for(key);
        let tmp = self.root.join(format!(".{key}.json.tmp"));
        tokio::fs::write(&tmp, raw.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))
            .map_err(|err| unavailable(key, err))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))
            .map_err(|err| unavailable(key, err))?;

        Ok(token_for(&raw))
    }
}
