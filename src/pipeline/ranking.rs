//! Per-topic candidate ranking.

use std::collections::HashMap;

use super::guard::guard_pass_text;
use super::normalize::NormalizedText;
use super::scoring::score_text;
use super::types::Topic;

/// An admitted item of one topic. `item_index` points into the item pool.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub item_index: usize,
    pub score: f64,
    pub base_hits: Vec<String>,
    pub radar_hits: Vec<String>,
}

/// Admitted candidates of one topic, best first.
#[derive(Debug, Clone)]
pub struct RankedTopic<'a> {
    pub topic: &'a Topic,
    pub candidates: Vec<RankedCandidate>,
}

/// Guards, scores and sorts the pool for a single topic.
///
/// Items scoring below `min_score` are dropped. The sort is stable, so equal
/// scores keep pool order.
#[must_use]
pub fn rank_topic<'a>(
    texts: &[NormalizedText],
    topic: &'a Topic,
    radar_terms: &[String],
) -> RankedTopic<'a> {
    let mut candidates: Vec<RankedCandidate> = texts
        .iter()
        .enumerate()
        .filter(|(_, text)| guard_pass_text(text, topic.guard.as_ref()))
        .filter_map(|(item_index, text)| {
            let outcome = score_text(
                text,
                &topic.keywords,
                radar_terms,
                &topic.low_weight_keywords,
            );
            (outcome.score >= topic.min_score).then(|| RankedCandidate {
                item_index,
                score: outcome.score,
                base_hits: outcome.base_hits,
                radar_hits: outcome.radar_hits,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    RankedTopic { topic, candidates }
}

/// Ranks every enabled topic in configuration order.
///
/// `radar_terms` maps topic id to the trend terms that apply to it; topics
/// without an entry get no radar boost.
#[must_use]
pub fn rank_topics<'a>(
    texts: &[NormalizedText],
    topics: &'a [Topic],
    radar_terms: &HashMap<String, Vec<String>>,
) -> Vec<RankedTopic<'a>> {
    topics
        .iter()
        .filter(|topic| topic.enabled)
        .map(|topic| {
            let terms = radar_terms
                .get(&topic.id)
                .map_or(&[][..], Vec::as_slice);
            rank_topic(texts, topic, terms)
        })
        .collect()
}
