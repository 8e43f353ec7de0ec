/// エラー分類とリトライ判定ユーティリティ。
use anyhow::Error;
use reqwest::StatusCode;

use crate::clients::NotifyError;
use crate::config::ConfigError;
use crate::settings::SettingsError;
use crate::store::StoreError;

/// エラーの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// リトライ可能なエラー（一時的なネットワークエラー、版の競合など）
    Retryable,
    /// リトライ不可能なエラー（拒否されたリクエストなど）
    NonRetryable,
    /// 致命的なエラー（データ破損、設定エラーなど）
    Fatal,
}

/// エラーチェーンの先頭から既知のエラー型を探して分類する。
#[must_use]
pub fn classify_error(error: &Error) -> ErrorKind {
    for cause in error.chain() {
        if let Some(store_err) = cause.downcast_ref::<StoreError>() {
            return match store_err {
                StoreError::Conflict { .. } | StoreError::Unavailable { .. } => {
                    ErrorKind::Retryable
                }
                StoreError::Corrupt { .. } | StoreError::InvalidKey { .. } => ErrorKind::Fatal,
            };
        }

        if let Some(notify_err) = cause.downcast_ref::<NotifyError>() {
            return match notify_err {
                NotifyError::Transport(inner) => classify_reqwest(inner),
                NotifyError::Rejected { status, .. } => classify_status(*status),
                NotifyError::NotConfigured => ErrorKind::Fatal,
            };
        }

        if cause.downcast_ref::<ConfigError>().is_some()
            || cause.downcast_ref::<SettingsError>().is_some()
        {
            return ErrorKind::Fatal;
        }

        if let Some(reqwest_err) = cause.downcast_ref::<reqwest::Error>() {
            return classify_reqwest(reqwest_err);
        }
    }

    // デフォルトはリトライ不可能
    ErrorKind::NonRetryable
}

fn classify_reqwest(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() || error.is_connect() {
        return ErrorKind::Retryable;
    }
    error
        .status()
        .map_or(ErrorKind::NonRetryable, classify_status)
}

fn classify_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Fatal,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::Retryable,
        s if s.is_server_error() => ErrorKind::Retryable,
        _ => ErrorKind::NonRetryable,
    }
}

/// エラーがリトライ可能かどうかを判定する。
#[must_use]
pub fn is_retryable(error: &Error) -> bool {
    matches!(classify_error(error), ErrorKind::Retryable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn plain_error_is_non_retryable() {
        let error = anyhow!("validation failed");
        assert!(!is_retryable(&error));
        assert_eq!(classify_error(&error), ErrorKind::NonRetryable);
    }

    #[test]
    fn store_conflict_is_retryable_through_context() {
        let error = Err::<(), _>(StoreError::Conflict {
            key: "watchlist".to_string(),
        })
        .context("advancing watchlist")
        .unwrap_err();
        assert!(is_retryable(&error));
    }

    #[test]
    fn corrupt_document_is_fatal() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = Error::new(StoreError::Corrupt {
            key: "subscribers".to_string(),
            source,
        });
        assert_eq!(classify_error(&error), ErrorKind::Fatal);
    }

    #[test]
    fn rejected_push_classified_by_status() {
        let rejected = |status| {
            Error::new(NotifyError::Rejected {
                status,
                body: String::new(),
            })
        };
        assert_eq!(
            classify_error(&rejected(StatusCode::TOO_MANY_REQUESTS)),
            ErrorKind::Retryable
        );
        assert_eq!(
            classify_error(&rejected(StatusCode::BAD_REQUEST)),
            ErrorKind::NonRetryable
        );
        assert_eq!(
            classify_error(&rejected(StatusCode::UNAUTHORIZED)),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn missing_config_is_fatal() {
        let error = Error::new(ConfigError::Missing("DIGEST_ITEMS_PATH"));
        assert_eq!(classify_error(&error), ErrorKind::Fatal);
    }
}
