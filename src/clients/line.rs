/// LINE Messaging APIのpushクライアント。
///
/// テキストは送信前に上限文字数で切り詰めます。
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{debug, warn};

use super::{Notifier, NotifyError};
use crate::util::text::truncate_chars;

/// push APIが受け付けるテキストメッセージの最大文字数。
pub const MAX_TEXT_CHARS: usize = 4900;

const PUSH_PATH: &str = "v2/bot/message/push";

#[derive(Debug, Clone)]
pub struct LineConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Clone)]
pub struct LinePushNotifier {
    client: Client,
    push_url: Url,
    access_token: String,
}

impl LinePushNotifier {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: LineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build LINE HTTP client")?;

        let base_url = Url::parse(&config.base_url).context("invalid LINE API base URL")?;
        let push_url = base_url
            .join(PUSH_PATH)
            .context("failed to build LINE push URL")?;

        Ok(Self {
            client,
            push_url,
            access_token: config.access_token,
        })
    }
}

#[async_trait]
impl Notifier for LinePushNotifier {
    async fn push(&self, recipient: &str, text: &str) -> Result<(), NotifyError> {
        if self.access_token.trim().is_empty() {
            return Err(NotifyError::NotConfigured);
        }

        let body = PushRequest {
            to: recipient,
            messages: [TextMessage {
                kind: "text",
                text: truncate_chars(text, MAX_TEXT_CHARS),
            }],
        };

        let response = self
            .client
            .post(self.push_url.clone())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(recipient, "push accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(recipient, %status, "push rejected");
        Err(NotifyError::Rejected { status, body })
    }
}
