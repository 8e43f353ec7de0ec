//! Core type definitions for the selection engine.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fallback::FallbackPolicy;
use super::guard::Guard;

/// A deduplicated content unit handed over by the item source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub title: String,
    /// Dedup key across the pool and across runs.
    pub link: String,
    #[serde(default)]
    pub summary: String,
    pub published: DateTime<Utc>,
}

impl CandidateItem {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        summary: impl Into<String>,
        published: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            summary: summary.into(),
            published,
        }
    }
}

/// A validated topic definition.
///
/// Built by [`crate::settings::DigestSettings::load`]; the engine never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Admission threshold for strict candidates.
    pub min_score: f64,
    pub keywords: Vec<String>,
    /// Subset of `keywords` scored with the demoted weights.
    pub low_weight_keywords: Vec<String>,
    pub guard: Option<Guard>,
    pub fallback_policy: FallbackPolicy,
    /// Trend regions feeding this topic. `None` means every region.
    pub radar_regions: Option<Vec<String>>,
}

impl Topic {
    /// Minimal enabled topic with no guard and no fallback.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            min_score: 0.0,
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            low_weight_keywords: Vec::new(),
            guard: None,
            fallback_policy: FallbackPolicy::None,
            radar_regions: None,
        }
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    #[must_use]
    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, policy: FallbackPolicy) -> Self {
        self.fallback_policy = policy;
        self
    }

    #[must_use]
    pub fn with_low_weight(mut self, keywords: &[&str]) -> Self {
        self.low_weight_keywords = keywords.iter().map(|k| (*k).to_string()).collect();
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// One entry of the digest: a scored pick, a fallback pick, or a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub topic_id: String,
    pub topic_name: String,
    pub score: f64,
    /// `None` marks a placeholder ("nothing qualified today").
    pub item: Option<CandidateItem>,
    pub base_hits: Vec<String>,
    pub radar_hits: Vec<String>,
    pub is_fallback: bool,
}

impl ScoredCandidate {
    /// Placeholder entry for a topic with no eligible item.
    #[must_use]
    pub fn placeholder(topic: &Topic) -> Self {
        Self {
            topic_id: topic.id.clone(),
            topic_name: topic.name.clone(),
            score: 0.0,
            item: None,
            base_hits: Vec::new(),
            radar_hits: Vec::new(),
            is_fallback: false,
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.item.is_none()
    }

    #[must_use]
    pub fn link(&self) -> Option<&str> {
        self.item.as_ref().map(|item| item.link.as_str())
    }
}

/// Ordered output of one allocation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickSet(Vec<ScoredCandidate>);

impl PickSet {
    #[must_use]
    pub fn new(entries: Vec<ScoredCandidate>) -> Self {
        Self(entries)
    }

    #[must_use]
    pub fn entries(&self) -> &[ScoredCandidate] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredCandidate> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries backed by a real item.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.0.iter().filter(|entry| entry.item.is_some()).count()
    }

    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.0.len() - self.item_count()
    }

    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.0.iter().filter(|entry| entry.is_fallback).count()
    }
}

impl<'a> IntoIterator for &'a PickSet {
    type Item = &'a ScoredCandidate;
    type IntoIter = std::slice::Iter<'a, ScoredCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Trend (radar) terms supplied by the trend collector.
///
/// `global` applies to every topic; `regions` holds region-tagged lists that a
/// topic may opt into through `radar_regions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendTerms {
    #[serde(default)]
    pub global: Vec<String>,
    #[serde(default)]
    pub regions: BTreeMap<String, Vec<String>>,
}

impl TrendTerms {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.iter().all(|term| term.trim().is_empty())
            && self
                .regions
                .values()
                .flatten()
                .all(|term| term.trim().is_empty())
    }

    /// Every term, global first, then regions in key order.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        dedup_terms(self.global.iter().chain(self.regions.values().flatten()))
    }

    /// Global terms plus the listed regions (all regions when `None`).
    #[must_use]
    pub fn for_regions(&self, regions: Option<&[String]>) -> Vec<String> {
        let Some(regions) = regions else {
            return self.all();
        };
        let selected = regions
            .iter()
            .filter_map(|region| self.regions.get(region))
            .flatten();
        dedup_terms(self.global.iter().chain(selected))
    }

    /// Per-topic term lists keyed by topic id.
    #[must_use]
    pub fn topic_map(&self, topics: &[Topic]) -> HashMap<String, Vec<String>> {
        topics
            .iter()
            .map(|topic| {
                (
                    topic.id.clone(),
                    self.for_regions(topic.radar_regions.as_deref()),
                )
            })
            .collect()
    }

    /// Concatenates both term sets region by region.
    #[must_use]
    pub fn merge(mut self, other: TrendTerms) -> Self {
        self.global.extend(other.global);
        for (region, terms) in other.regions {
            self.regions.entry(region).or_default().extend(terms);
        }
        self
    }
}

fn dedup_terms<'a>(terms: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .map(|term| term.trim())
        .filter(|term| !term.is_empty())
        .filter(|term| seen.insert(term.to_lowercase()))
        .map(ToString::to_string)
        .collect()
}
