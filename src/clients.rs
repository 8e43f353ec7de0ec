//! Push delivery transports.

pub mod line;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;

pub use line::{LineConfig, LinePushNotifier};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("push request failed")]
    Transport(#[from] reqwest::Error),
    #[error("push rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("push transport is not configured")]
    NotConfigured,
}

/// Sends one text message to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, recipient: &str, text: &str) -> Result<(), NotifyError>;
}

/// Prints messages instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn push(&self, recipient: &str, text: &str) -> Result<(), NotifyError> {
        info!(recipient, chars = text.chars().count(), "dry-run push");
        println!("--- to {recipient} ---\n{text}\n");
        Ok(())
    }
}
