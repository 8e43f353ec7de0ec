//! Digest configuration file (`config.yml`).
//!
//! Loaded once at startup and validated as a whole; every problem found here
//! is fatal and reported before any digest work starts.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::pipeline::normalize::normalize_term;
use crate::pipeline::{AllocationParams, DigestFormat, FallbackPolicy, Guard, Topic, TrendTerms, WatchPolicy};

/// Upper bound for hour-valued windows (about a century).
pub const MAX_WINDOW_HOURS: i64 = 24 * 365 * 100;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read digest config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse digest config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("`topics` in {path} must be a list")]
    TopicsNotAList { path: PathBuf },
    #[error("duplicate topic id {id:?}")]
    DuplicateTopicId { id: String },
    #[error("topic {id:?}: {reason}")]
    InvalidTopic { id: String, reason: String },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// `digest` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DigestSection {
    pub title: String,
    pub max_items: usize,
    pub min_per_topic: usize,
    pub lookback_hours: i64,
    pub max_message_chars: usize,
}

impl Default for DigestSection {
    fn default() -> Self {
        let format = DigestFormat::default();
        let params = AllocationParams::default();
        Self {
            title: format.title,
            max_items: params.max_items,
            min_per_topic: params.min_per_topic,
            lookback_hours: 36,
            max_message_chars: format.max_chars,
        }
    }
}

impl DigestSection {
    #[must_use]
    pub fn allocation_params(&self) -> AllocationParams {
        AllocationParams {
            max_items: self.max_items,
            min_per_topic: self.min_per_topic,
        }
    }

    #[must_use]
    pub fn format(&self) -> DigestFormat {
        DigestFormat {
            title: self.title.clone(),
            max_chars: self.max_message_chars,
        }
    }
}

/// `delivery` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeliverySection {
    /// Consecutive failed pushes after which a subscriber is dropped.
    pub unsubscribe_after_failures: u32,
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            unsubscribe_after_failures: 3,
        }
    }
}

/// Validated digest configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigestSettings {
    pub digest: DigestSection,
    pub watch: WatchPolicy,
    pub delivery: DeliverySection,
    /// Static trend terms, merged with the trend file when one is configured.
    pub radar: TrendTerms,
    pub topics: Vec<Topic>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    digest: DigestSection,
    #[serde(default)]
    watch: WatchPolicy,
    #[serde(default)]
    delivery: DeliverySection,
    #[serde(default)]
    radar: TrendTerms,
    #[serde(default)]
    topics: Vec<RawTopic>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTopic {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    min_score: Option<f64>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    low_weight_keywords: Vec<String>,
    #[serde(default)]
    guard: Option<Guard>,
    #[serde(default)]
    fallback: Option<FallbackPolicy>,
    #[serde(default)]
    radar_regions: Option<Vec<String>>,
}

impl DigestSettings {
    /// Reads and validates the YAML file at `path`.
    ///
    /// # Errors
    /// Returns [`SettingsError`] when the file cannot be read or parsed, or
    /// when any section fails validation.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_yaml(&contents, path)?;
        info!(
            path = %path.display(),
            topics = settings.topics.len(),
            enabled = settings.enabled_topics().count(),
            "digest config loaded"
        );
        Ok(settings)
    }

    /// Parses and validates YAML text; `origin` is only used in errors.
    ///
    /// # Errors
    /// See [`DigestSettings::load`].
    pub fn from_yaml(contents: &str, origin: &Path) -> Result<Self, SettingsError> {
        let parse_error = |source| SettingsError::Parse {
            path: origin.to_path_buf(),
            source,
        };

        let mut document: serde_yaml::Value =
            serde_yaml::from_str(contents).map_err(parse_error)?;
        if document.is_null() {
            return Ok(Self::default());
        }
        // (is null, is a list)
        let topics_shape = document
            .get("topics")
            .map(|topics| (topics.is_null(), topics.is_sequence()));
        match topics_shape {
            Some((true, _)) => {
                if let Some(mapping) = document.as_mapping_mut() {
                    mapping.remove("topics");
                }
            }
            Some((false, false)) => {
                return Err(SettingsError::TopicsNotAList {
                    path: origin.to_path_buf(),
                });
            }
            _ => {}
        }

        let raw: RawSettings = serde_yaml::from_value(document).map_err(parse_error)?;
        validate_sections(&raw)?;

        let topics = build_topics(raw.topics)?;
        Ok(Self {
            digest: raw.digest,
            watch: raw.watch,
            delivery: raw.delivery,
            radar: raw.radar,
            topics,
        })
    }

    pub fn enabled_topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter().filter(|topic| topic.enabled)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn validate_sections(raw: &RawSettings) -> Result<(), SettingsError> {
    let digest = &raw.digest;
    if digest.max_items == 0 {
        return Err(invalid("digest.max_items", "must be at least 1"));
    }
    if digest.min_per_topic == 0 {
        return Err(invalid("digest.min_per_topic", "must be at least 1"));
    }
    if digest.lookback_hours <= 0 || digest.lookback_hours > MAX_WINDOW_HOURS {
        return Err(invalid(
            "digest.lookback_hours",
            format!("must be between 1 and {MAX_WINDOW_HOURS}"),
        ));
    }
    if digest.max_message_chars == 0 {
        return Err(invalid("digest.max_message_chars", "must be at least 1"));
    }

    let watch = &raw.watch;
    if !(0..=MAX_WINDOW_HOURS).contains(&watch.delay_hours) {
        return Err(invalid(
            "watch.delay_hours",
            format!("must be between 0 and {MAX_WINDOW_HOURS}"),
        ));
    }
    if !watch.min_score_to_watch.is_finite() || watch.min_score_to_watch < 0.0 {
        return Err(invalid(
            "watch.min_score_to_watch",
            "must be a finite, non-negative number",
        ));
    }

    if raw.delivery.unsubscribe_after_failures == 0 {
        return Err(invalid(
            "delivery.unsubscribe_after_failures",
            "must be at least 1",
        ));
    }
    Ok(())
}

fn build_topics(raw_topics: Vec<RawTopic>) -> Result<Vec<Topic>, SettingsError> {
    let mut seen_ids = HashSet::new();
    let mut topics = Vec::with_capacity(raw_topics.len());

    for (index, raw) in raw_topics.into_iter().enumerate() {
        let id = raw
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| format!("topic_{index}"), ToString::to_string);
        if !seen_ids.insert(id.clone()) {
            return Err(SettingsError::DuplicateTopicId { id });
        }
        topics.push(build_topic(id, raw)?);
    }

    Ok(topics)
}

fn build_topic(id: String, raw: RawTopic) -> Result<Topic, SettingsError> {
    let invalid_topic = |reason: String| SettingsError::InvalidTopic {
        id: id.clone(),
        reason,
    };

    let min_score = raw.min_score.unwrap_or(0.0);
    if !min_score.is_finite() || min_score < 0.0 {
        return Err(invalid_topic(format!(
            "min_score must be a finite, non-negative number, got {min_score}"
        )));
    }

    let keywords = dedup_keywords(&raw.keywords);
    if keywords.len() != raw.keywords.iter().filter(|k| !k.trim().is_empty()).count() {
        debug!(topic_id = %id, "duplicate keywords dropped");
    }

    let known: HashSet<String> = keywords.iter().filter_map(|k| normalize_term(k)).collect();
    let low_weight_keywords = dedup_keywords(&raw.low_weight_keywords);
    if let Some(stray) = low_weight_keywords
        .iter()
        .find(|keyword| normalize_term(keyword).is_some_and(|term| !known.contains(&term)))
    {
        return Err(invalid_topic(format!(
            "low-weight keyword {stray:?} is not one of the topic keywords"
        )));
    }

    let fallback_policy = raw.fallback.unwrap_or_default();
    match &fallback_policy {
        FallbackPolicy::None => {}
        FallbackPolicy::OfficialSourceOnly { allow_domains } => {
            if allow_domains.iter().all(|d| d.trim().is_empty()) {
                return Err(invalid_topic(
                    "official_source_only fallback needs allow_domains".to_string(),
                ));
            }
        }
        FallbackPolicy::ContextCoOccurrence { entities, contexts } => {
            if entities.iter().all(|t| t.trim().is_empty())
                || contexts.iter().all(|t| t.trim().is_empty())
            {
                return Err(invalid_topic(
                    "context_co_occurrence fallback needs entities and contexts".to_string(),
                ));
            }
        }
    }

    let name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(|| id.clone(), ToString::to_string);

    Ok(Topic {
        name,
        enabled: raw.enabled.unwrap_or(true),
        min_score,
        keywords,
        low_weight_keywords,
        guard: raw.guard.filter(|guard| !guard.is_empty()),
        fallback_policy,
        radar_regions: raw.radar_regions,
        id,
    })
}

/// Trims, drops blanks and keeps the first spelling of case-insensitive duplicates.
fn dedup_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|keyword| keyword.trim())
        .filter(|keyword| normalize_term(keyword).is_some_and(|term| seen.insert(term)))
        .map(ToString::to_string)
        .collect()
}
