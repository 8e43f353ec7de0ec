//! Keyword-tier relevance scoring.
//!
//! | term class            | title hit | blob-only hit |
//! |-----------------------|-----------|---------------|
//! | base keyword          | 2.0       | 1.0           |
//! | low-weight keyword    | 0.5       | 0.2           |
//! | trend (radar) term    | 0.8       | 0.4           |
//!
//! Each distinct term counts once, title tier first. Scores are plain sums with
//! no upper bound and no length normalization.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::normalize::{NormalizedText, normalize_term};
use super::types::CandidateItem;

pub const BASE_TITLE_WEIGHT: f64 = 2.0;
pub const BASE_BLOB_WEIGHT: f64 = 1.0;
pub const LOW_WEIGHT_TITLE_WEIGHT: f64 = 0.5;
pub const LOW_WEIGHT_BLOB_WEIGHT: f64 = 0.2;
pub const RADAR_TITLE_WEIGHT: f64 = 0.8;
pub const RADAR_BLOB_WEIGHT: f64 = 0.4;

/// Score of one (item, topic) pair with the terms that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score: f64,
    /// Matched topic keywords, as configured, first match first.
    pub base_hits: Vec<String>,
    /// Matched trend terms, as supplied.
    pub radar_hits: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct TierWeights {
    title: f64,
    blob: f64,
}

const BASE: TierWeights = TierWeights {
    title: BASE_TITLE_WEIGHT,
    blob: BASE_BLOB_WEIGHT,
};
const LOW_WEIGHT: TierWeights = TierWeights {
    title: LOW_WEIGHT_TITLE_WEIGHT,
    blob: LOW_WEIGHT_BLOB_WEIGHT,
};
const RADAR: TierWeights = TierWeights {
    title: RADAR_TITLE_WEIGHT,
    blob: RADAR_BLOB_WEIGHT,
};

/// Scores a raw item against a topic's keyword tiers and the trend terms.
#[must_use]
pub fn score_item(
    item: &CandidateItem,
    base_keywords: &[String],
    radar_terms: &[String],
    low_weight_keywords: &[String],
) -> ScoreOutcome {
    score_text(
        &NormalizedText::from_item(item),
        base_keywords,
        radar_terms,
        low_weight_keywords,
    )
}

/// Same as [`score_item`] on an already normalized item.
#[must_use]
pub fn score_text(
    text: &NormalizedText,
    base_keywords: &[String],
    radar_terms: &[String],
    low_weight_keywords: &[String],
) -> ScoreOutcome {
    let demoted: HashSet<String> = low_weight_keywords
        .iter()
        .filter_map(|keyword| normalize_term(keyword))
        .collect();

    let mut outcome = ScoreOutcome::default();

    let mut seen = HashSet::new();
    for keyword in base_keywords {
        let Some(term) = normalize_term(keyword) else {
            continue;
        };
        if !seen.insert(term.clone()) {
            continue;
        }
        let weights = if demoted.contains(&term) { LOW_WEIGHT } else { BASE };
        if let Some(points) = tier_points(text, &term, weights) {
            outcome.score += points;
            outcome.base_hits.push(keyword.trim().to_string());
        }
    }

    let mut seen = HashSet::new();
    for radar in radar_terms {
        let Some(term) = normalize_term(radar) else {
            continue;
        };
        if !seen.insert(term.clone()) {
            continue;
        }
        if let Some(points) = tier_points(text, &term, RADAR) {
            outcome.score += points;
            outcome.radar_hits.push(radar.trim().to_string());
        }
    }

    outcome
}

fn tier_points(text: &NormalizedText, term: &str, weights: TierWeights) -> Option<f64> {
    if text.title.contains(term) {
        Some(weights.title)
    } else if text.blob.contains(term) {
        Some(weights.blob)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn item(title: &str, summary: &str) -> CandidateItem {
        CandidateItem::new(title, "https://example.com/x", summary, Utc::now())
    }

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn title_hit_scores_two() {
        let outcome = score_item(&item("AI breakthrough", ""), &terms(&["AI"]), &[], &[]);
        assert!((outcome.score - 2.0).abs() < 1e-9);
        assert_eq!(outcome.base_hits, vec!["AI"]);
        assert!(outcome.radar_hits.is_empty());
    }

    #[test]
    fn summary_only_hit_scores_one() {
        let outcome = score_item(
            &item("tech news", "...AI regulation..."),
            &terms(&["AI"]),
            &[],
            &[],
        );
        assert!((outcome.score - 1.0).abs() < 1e-9);
        assert_eq!(outcome.base_hits, vec!["AI"]);
    }

    #[rstest]
    #[case("cloud outage", "", 0.5)]
    #[case("outage report", "in the cloud", 0.2)]
    #[case("outage report", "on premises", 0.0)]
    fn low_weight_keywords_are_demoted(
        #[case] title: &str,
        #[case] summary: &str,
        #[case] expected: f64,
    ) {
        let outcome = score_item(
            &item(title, summary),
            &terms(&["Cloud"]),
            &[],
            &terms(&["cloud"]),
        );
        assert!((outcome.score - expected).abs() < 1e-9);
    }

    #[test]
    fn radar_terms_add_their_own_tier() {
        let outcome = score_item(
            &item("Nvidia earnings", "chip demand from tsmc"),
            &terms(&["chip"]),
            &terms(&["Nvidia", "TSMC", "Fed"]),
            &[],
        );
        // chip (blob 1.0) + Nvidia (title 0.8) + TSMC (blob 0.4)
        assert!((outcome.score - 2.2).abs() < 1e-9);
        assert_eq!(outcome.base_hits, vec!["chip"]);
        assert_eq!(outcome.radar_hits, vec!["Nvidia", "TSMC"]);
    }

    #[test]
    fn duplicate_and_blank_terms_count_once() {
        let outcome = score_item(
            &item("AI AI AI", ""),
            &terms(&["AI", "ai", "  ", ""]),
            &[],
            &[],
        );
        assert!((outcome.score - 2.0).abs() < 1e-9);
        assert_eq!(outcome.base_hits, vec!["AI"]);
    }

    #[test]
    fn scoring_is_idempotent() {
        let it = item("AI policy", "regulation of ai");
        let first = score_item(&it, &terms(&["ai", "policy"]), &terms(&["eu"]), &[]);
        let second = score_item(&it, &terms(&["ai", "policy"]), &terms(&["eu"]), &[]);
        assert_eq!(first, second);
    }
}
