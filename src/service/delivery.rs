//! Per-recipient push fan-out.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clients::Notifier;
use crate::util::error::{classify_error, is_retryable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub recipient: String,
    /// Rendered error for failed pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DeliveryReport {
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    /// `(recipient, succeeded)` pairs for subscriber bookkeeping.
    #[must_use]
    pub fn as_pairs(&self) -> Vec<(String, bool)> {
        self.outcomes
            .iter()
            .map(|o| (o.recipient.clone(), o.is_success()))
            .collect()
    }
}

/// Pushes `text` to every recipient. A failure never stops the remaining pushes.
///
/// A transient failure (timeout, 429, 5xx) gets one more attempt.
pub async fn deliver(notifier: &dyn Notifier, recipients: &[String], text: &str) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for recipient in recipients {
        let error = match push_with_retry(notifier, recipient, text).await {
            Ok(()) => None,
            Err(err) => {
                warn!(recipient = %recipient, kind = ?classify_error(&err), error = %err, "push failed");
                Some(format!("{err:#}"))
            }
        };
        report.outcomes.push(DeliveryOutcome {
            recipient: recipient.clone(),
            error,
        });
    }
    info!(
        delivered = report.delivered(),
        failed = report.failed(),
        "delivery finished"
    );
    report
}

async fn push_with_retry(
    notifier: &dyn Notifier,
    recipient: &str,
    text: &str,
) -> anyhow::Result<()> {
    let Err(first) = notifier.push(recipient, text).await else {
        return Ok(());
    };
    let first = anyhow::Error::new(first);
    if !is_retryable(&first) {
        return Err(first);
    }
    debug!(recipient, error = %first, "transient push failure, retrying once");
    notifier
        .push(recipient, text)
        .await
        .map_err(anyhow::Error::new)
}
