//! Item and trend-term inputs.
//!
//! Feed retrieval happens upstream; this module reads what the collectors
//! left behind and applies the per-item tolerance rules.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::pipeline::{CandidateItem, TrendTerms};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Candidate pool for a run at `now`, deduplicated by link.
    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<CandidateItem>, SourceError>;
}

#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn fetch(&self) -> Result<TrendTerms, SourceError>;
}

/// One entry as written by the feed collector. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct RawItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    published: Option<Value>,
}

/// Applies the ingestion rules to raw collector output.
///
/// Entries without a title or link are dropped, a missing or unparsable
/// `published` becomes `now`, entries older than `lookback` are dropped and
/// the first occurrence of a link wins.
#[must_use]
pub fn ingest_raw_items(raw: Vec<Value>, now: DateTime<Utc>, lookback: Duration) -> Vec<CandidateItem> {
    let cutoff = now
        .checked_sub_signed(lookback)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    let mut dropped = 0_usize;

    for value in raw {
        let entry: RawItem = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping malformed item entry");
                dropped += 1;
                continue;
            }
        };

        let title = entry.title.as_deref().map(str::trim).unwrap_or_default();
        let link = entry.link.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() || link.is_empty() {
            dropped += 1;
            continue;
        }

        let published = entry
            .published
            .as_ref()
            .and_then(parse_published)
            .unwrap_or(now);
        if published < cutoff {
            dropped += 1;
            continue;
        }

        if !seen.insert(link.to_string()) {
            dropped += 1;
            continue;
        }

        let summary = entry.summary.as_deref().map(str::trim).unwrap_or_default();
        items.push(CandidateItem::new(title, link, summary, published));
    }

    debug!(kept = items.len(), dropped, "items ingested");
    items
}

fn parse_published(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .or_else(|_| DateTime::parse_from_rfc2822(raw.trim()))
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

async fn read_json(path: &Path) -> Result<Value, SourceError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON array of items written by the feed collector.
#[derive(Debug, Clone)]
pub struct JsonFileItemSource {
    path: PathBuf,
    lookback: Duration,
}

impl JsonFileItemSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, lookback_hours: i64) -> Self {
        Self {
            path: path.into(),
            lookback: Duration::try_hours(lookback_hours).unwrap_or(Duration::MAX),
        }
    }
}

#[async_trait]
impl ItemSource for JsonFileItemSource {
    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<CandidateItem>, SourceError> {
        let value = read_json(&self.path).await?;
        let raw = match value {
            Value::Array(entries) => entries,
            other => {
                return Err(SourceError::Parse {
                    path: self.path.clone(),
                    source: serde::de::Error::custom(format!(
                        "expected an array of items, found {}",
                        json_kind(&other)
                    )),
                });
            }
        };
        Ok(ingest_raw_items(raw, now, self.lookback))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Trend file layouts accepted by [`JsonFileTrendSource`].
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TrendFile {
    Flat(Vec<String>),
    Regional(TrendTerms),
}

/// Reads trend terms from JSON: either a flat list or `{global, regions}`.
#[derive(Debug, Clone)]
pub struct JsonFileTrendSource {
    path: PathBuf,
}

impl JsonFileTrendSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TrendSource for JsonFileTrendSource {
    async fn fetch(&self) -> Result<TrendTerms, SourceError> {
        let value = read_json(&self.path).await?;
        let file: TrendFile = serde_json::from_value(value).map_err(|source| SourceError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(match file {
            TrendFile::Flat(global) => TrendTerms {
                global,
                ..TrendTerms::default()
            },
            TrendFile::Regional(terms) => terms,
        })
    }
}

/// Fixed trend terms, typically the `radar` section of the digest configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTrendSource {
    terms: TrendTerms,
}

impl StaticTrendSource {
    #[must_use]
    pub fn new(terms: TrendTerms) -> Self {
        Self { terms }
    }
}

#[async_trait]
impl TrendSource for StaticTrendSource {
    async fn fetch(&self) -> Result<TrendTerms, SourceError> {
        Ok(self.terms.clone())
    }
}

/// Merges several trend sources; a failing source is logged and skipped.
pub struct CombinedTrendSource {
    sources: Vec<Box<dyn TrendSource>>,
}

impl CombinedTrendSource {
    #[must_use]
    pub fn new(sources: Vec<Box<dyn TrendSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl TrendSource for CombinedTrendSource {
    async fn fetch(&self) -> Result<TrendTerms, SourceError> {
        let mut merged = TrendTerms::default();
        for source in &self.sources {
            match source.fetch().await {
                Ok(terms) => merged = merged.merge(terms),
                Err(err) => warn!(error = ?err, "trend source failed, continuing without it"),
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn ingest_applies_defaults_and_filters() {
        let raw = vec![
            json!({"title": " AI news ", "link": "https://a.com/1", "published": "2026-03-01T12:00:00Z"}),
            json!({"title": "", "link": "https://a.com/2"}),
            json!({"title": "no link"}),
            json!({"title": "dup", "link": "https://a.com/1"}),
            json!({"title": "stale", "link": "https://a.com/3", "published": "2026-02-20T00:00:00Z"}),
            json!({"title": "undated", "link": "https://a.com/4", "published": "yesterday"}),
            json!("not an object"),
        ];

        let items = ingest_raw_items(raw, now(), Duration::hours(36));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "AI news");
        assert_eq!(items[0].summary, "");
        assert_eq!(items[1].link, "https://a.com/4");
        assert_eq!(items[1].published, now());
    }

    #[test]
    fn oversized_lookback_keeps_everything() {
        let raw = vec![json!({"title": "old", "link": "l1", "published": 0})];
        let source = JsonFileItemSource::new("unused.json", i64::MAX);
        let items = ingest_raw_items(raw, now(), source.lookback);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn ingest_accepts_rfc2822_and_epoch() {
        let raw = vec![
            json!({"title": "a", "link": "l1", "published": "Sun, 01 Mar 2026 20:00:00 +0000"}),
            json!({"title": "b", "link": "l2", "published": 1_772_380_800}),
        ];
        let items = ingest_raw_items(raw, now(), Duration::hours(36));
        assert_eq!(
            items[0].published,
            Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap()
        );
        assert_eq!(items[1].published.timestamp(), 1_772_380_800);
    }

    #[tokio::test]
    async fn json_file_item_source_reads_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(
            &path,
            r#"[{"title": "t", "link": "https://a.com/1", "summary": "<b>s</b>"}]"#,
        )
        .unwrap();

        let items = JsonFileItemSource::new(&path, 36).fetch(now()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].summary, "<b>s</b>");
    }

    #[tokio::test]
    async fn json_file_item_source_rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, r#"{"items": []}"#).unwrap();

        let err = JsonFileItemSource::new(&path, 36).fetch(now()).await.unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[tokio::test]
    async fn trend_file_accepts_flat_and_regional_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let flat = dir.path().join("flat.json");
        let regional = dir.path().join("regional.json");
        std::fs::write(&flat, r#"["Nvidia", "TSMC"]"#).unwrap();
        std::fs::write(&regional, r#"{"global": ["Fed"], "regions": {"tw": ["TSMC"]}}"#).unwrap();

        let flat_terms = JsonFileTrendSource::new(&flat).fetch().await.unwrap();
        let regional_terms = JsonFileTrendSource::new(&regional).fetch().await.unwrap();

        assert_eq!(flat_terms.global, vec!["Nvidia", "TSMC"]);
        assert_eq!(regional_terms.regions["tw"], vec!["TSMC"]);
    }

    #[tokio::test]
    async fn combined_source_skips_failures() {
        let combined = CombinedTrendSource::new(vec![
            Box::new(StaticTrendSource::new(TrendTerms {
                global: vec!["AI".to_string()],
                ..TrendTerms::default()
            })),
            Box::new(JsonFileTrendSource::new("/nonexistent/trends.json")),
        ]);
        let terms = combined.fetch().await.unwrap();
        assert_eq!(terms.global, vec!["AI"]);
    }
}
