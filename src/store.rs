//! Versioned JSON document storage.
//!
//! Every document carries an opaque [`VersionToken`]. A write must present the
//! token of the version it was derived from; a stale token fails with
//! [`StoreError::Conflict`] and the caller retries its read-modify-write (see
//! [`document::update`]).

pub(crate) mod document;
pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use file::FileKvStore;
pub use memory::MemoryKvStore;

/// Key of the delay tracker document.
pub const WATCHLIST_KEY: &str = "watchlist";
/// Key of the subscriber document.
pub const SUBSCRIBERS_KEY: &str = "subscribers";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: VersionToken,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {key} was modified concurrently")]
    Conflict { key: String },
    #[error("store unavailable for {key}")]
    Unavailable {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("document {key} is not valid JSON for its type")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid document key {key:?}")]
    InvalidKey { key: String },
}

impl StoreError {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Conflict { key }
            | Self::Unavailable { key, .. }
            | Self::Corrupt { key, .. }
            | Self::InvalidKey { key } => key,
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Key-value store of whole JSON documents with optimistic concurrency.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Current document and its version, or `None` when the key is absent.
    async fn read(&self, key: &str) -> Result<Option<Versioned<Value>>, StoreError>;

    /// Replaces the document.
    ///
    /// `expected` must be the version last read, or `None` when the caller saw
    /// no document. Any mismatch fails with [`StoreError::Conflict`].
    async fn write(
        &self,
        key: &str,
        value: &Value,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError>;
}

/// Keys are restricted to ASCII letters, digits, `-` and `_`.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey {
            key: key.to_string(),
        })
    }
}
