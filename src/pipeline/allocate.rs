//! Coverage allocation: per-topic floor first, then global fill.
//!
//! Pass 1 walks topics in configuration order and gives each one its floor of
//! strict picks, a fallback pick when strict ranking runs dry, or a placeholder
//! when nothing is eligible at all. Pass 1 is never truncated, so the floor may
//! exceed `max_items`. Pass 2 fills the remaining capacity with the best unused
//! candidates of any topic.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fallback::FALLBACK_SCORE;
use super::normalize::NormalizedText;
use super::ranking::{RankedCandidate, RankedTopic, rank_topics};
use super::types::{CandidateItem, PickSet, ScoredCandidate, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationParams {
    /// Capacity for real items; only Pass 1 may exceed it.
    pub max_items: usize,
    /// Floor of entries per enabled topic. Treated as at least one.
    pub min_per_topic: usize,
}

impl Default for AllocationParams {
    fn default() -> Self {
        Self {
            max_items: 5,
            min_per_topic: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationStats {
    pub floor_picks: usize,
    pub fallback_picks: usize,
    pub placeholders: usize,
    pub fill_picks: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    pub picks: PickSet,
    pub stats: AllocationStats,
}

/// Selects the digest entries for one run.
///
/// `radar_terms` maps topic id to its applicable trend terms (see
/// [`crate::pipeline::TrendTerms::topic_map`]).
#[must_use]
pub fn allocate(
    items: &[CandidateItem],
    topics: &[Topic],
    params: AllocationParams,
    radar_terms: &HashMap<String, Vec<String>>,
) -> Allocation {
    let texts: Vec<NormalizedText> = items.iter().map(NormalizedText::from_item).collect();
    let ranked = rank_topics(&texts, topics, radar_terms);
    if ranked.is_empty() {
        debug!("no enabled topics, nothing to allocate");
        return Allocation::default();
    }

    let mut stats = AllocationStats::default();
    let mut used_links: HashSet<String> = HashSet::new();

    let mut entries = floor_pass(
        items,
        &texts,
        &ranked,
        params.min_per_topic.max(1),
        &mut used_links,
        &mut stats,
    );

    let filled = entries.iter().filter(|entry| entry.item.is_some()).count();
    let capacity = params.max_items.saturating_sub(filled);
    let fill = fill_pass(items, &ranked, capacity, &mut used_links);
    stats.fill_picks = fill.len();
    entries.extend(fill);

    debug!(
        floor_picks = stats.floor_picks,
        fallback_picks = stats.fallback_picks,
        placeholders = stats.placeholders,
        fill_picks = stats.fill_picks,
        "allocation finished"
    );

    Allocation {
        picks: PickSet::new(entries),
        stats,
    }
}

fn floor_pass(
    items: &[CandidateItem],
    texts: &[NormalizedText],
    ranked: &[RankedTopic<'_>],
    floor: usize,
    used_links: &mut HashSet<String>,
    stats: &mut AllocationStats,
) -> Vec<ScoredCandidate> {
    let mut entries = Vec::new();

    for ranked_topic in ranked {
        let topic = ranked_topic.topic;
        let mut block = Vec::new();

        for candidate in &ranked_topic.candidates {
            if block.len() >= floor {
                break;
            }
            let item = &items[candidate.item_index];
            if used_links.insert(item.link.clone()) {
                block.push(strict_entry(topic, item, candidate));
            }
        }
        stats.floor_picks += block.len();

        if block.len() < floor {
            let fallback = topic.fallback_policy.select(
                items,
                texts,
                used_links,
                topic.guard.as_ref(),
            );
            if let Some(index) = fallback {
                let item = &items[index];
                used_links.insert(item.link.clone());
                debug!(
                    topic_id = %topic.id,
                    policy = topic.fallback_policy.kind(),
                    link = %item.link,
                    "fallback pick"
                );
                block.push(fallback_entry(topic, item));
                stats.fallback_picks += 1;
            }
        }

        if block.is_empty() {
            debug!(topic_id = %topic.id, "no eligible item, adding placeholder");
            block.push(ScoredCandidate::placeholder(topic));
            stats.placeholders += 1;
        }

        entries.extend(block);
    }

    entries
}

fn fill_pass(
    items: &[CandidateItem],
    ranked: &[RankedTopic<'_>],
    capacity: usize,
    used_links: &mut HashSet<String>,
) -> Vec<ScoredCandidate> {
    if capacity == 0 {
        return Vec::new();
    }

    // Topic order then rank; the stable sort keeps that order among equal scores.
    let used: &HashSet<String> = used_links;
    let mut pool: Vec<(&Topic, &RankedCandidate)> = ranked
        .iter()
        .flat_map(move |ranked_topic| {
            ranked_topic
                .candidates
                .iter()
                .filter(move |candidate| !used.contains(&items[candidate.item_index].link))
                .map(move |candidate| (ranked_topic.topic, candidate))
        })
        .collect();
    pool.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));

    let mut fill = Vec::new();
    for (topic, candidate) in pool {
        if fill.len() >= capacity {
            break;
        }
        let item = &items[candidate.item_index];
        if used_links.insert(item.link.clone()) {
            fill.push(strict_entry(topic, item, candidate));
        }
    }
    fill
}

fn strict_entry(topic: &Topic, item: &CandidateItem, candidate: &RankedCandidate) -> ScoredCandidate {
    ScoredCandidate {
        topic_id: topic.id.clone(),
        topic_name: topic.name.clone(),
        score: candidate.score,
        item: Some(item.clone()),
        base_hits: candidate.base_hits.clone(),
        radar_hits: candidate.radar_hits.clone(),
        is_fallback: false,
    }
}

fn fallback_entry(topic: &Topic, item: &CandidateItem) -> ScoredCandidate {
    ScoredCandidate {
        topic_id: topic.id.clone(),
        topic_name: topic.name.clone(),
        score: FALLBACK_SCORE,
        item: Some(item.clone()),
        base_hits: Vec::new(),
        radar_hits: Vec::new(),
        is_fallback: true,
    }
}
