//! Delayed confirmation of picks against later trend terms.
//!
//! A strong pick is enrolled as `watching` with a due time. Once due it moves to
//! `done`, marked `fermented` when a then-current trend term shows up in its
//! title or link. Entries never move back from `done`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::normalize::{NormalizedText, normalize_terms};
use super::types::PickSet;

/// Maximum number of resolved entries kept, newest last.
pub const DONE_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub topic_id: String,
    pub link: String,
    #[serde(default)]
    pub title: String,
    pub score: f64,
    pub saved_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    /// Set when the entry is resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fermented: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Persisted tracker document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchlistState {
    #[serde(default)]
    pub watching: Vec<WatchlistEntry>,
    #[serde(default)]
    pub done: Vec<WatchlistEntry>,
}

impl WatchlistState {
    /// True when `link` is tracked in either state.
    #[must_use]
    pub fn knows(&self, link: &str) -> bool {
        self.watching
            .iter()
            .chain(&self.done)
            .any(|entry| entry.link == link)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchPolicy {
    pub enabled: bool,
    pub delay_hours: i64,
    pub min_score_to_watch: f64,
    pub max_candidates_per_topic: usize,
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_hours: 48,
            min_score_to_watch: 3.0,
            max_candidates_per_topic: 2,
        }
    }
}

/// What one `advance` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerReport {
    pub matured: usize,
    pub fermented: usize,
    pub enrolled: usize,
    pub evicted: usize,
    pub fermented_links: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct DelayTracker {
    policy: WatchPolicy,
}

impl DelayTracker {
    #[must_use]
    pub fn new(policy: WatchPolicy) -> Self {
        Self { policy }
    }

    /// Matures due entries, then enrolls qualifying picks.
    ///
    /// With the policy disabled only maturation runs, so already watched
    /// entries still resolve.
    #[must_use]
    pub fn advance(
        &self,
        state: WatchlistState,
        picks: &PickSet,
        trend_terms: &[String],
        now: DateTime<Utc>,
    ) -> (WatchlistState, TrackerReport) {
        let mut report = TrackerReport::default();
        let mut state = mature(state, trend_terms, now, &mut report);
        if self.policy.enabled {
            self.enroll(&mut state, picks, now, &mut report);
        }

        debug!(
            matured = report.matured,
            fermented = report.fermented,
            enrolled = report.enrolled,
            evicted = report.evicted,
            watching = state.watching.len(),
            done = state.done.len(),
            "watchlist advanced"
        );
        (state, report)
    }

    fn enroll(
        &self,
        state: &mut WatchlistState,
        picks: &PickSet,
        now: DateTime<Utc>,
        report: &mut TrackerReport,
    ) {
        let mut known: HashSet<String> = state
            .watching
            .iter()
            .chain(&state.done)
            .map(|entry| entry.link.clone())
            .collect();
        let Some(due_at) = Duration::try_hours(self.policy.delay_hours)
            .and_then(|delay| now.checked_add_signed(delay))
        else {
            warn!(
                delay_hours = self.policy.delay_hours,
                "watch delay out of range, skipping enrollment"
            );
            return;
        };
        let mut per_topic: HashMap<&str, usize> = HashMap::new();

        for pick in picks {
            let Some(item) = pick.item.as_ref() else {
                continue;
            };
            if pick.is_fallback || pick.score < self.policy.min_score_to_watch {
                continue;
            }
            let taken = per_topic.entry(pick.topic_id.as_str()).or_default();
            if *taken >= self.policy.max_candidates_per_topic {
                continue;
            }
            if !known.insert(item.link.clone()) {
                continue;
            }
            *taken += 1;
            state.watching.push(WatchlistEntry {
                topic_id: pick.topic_id.clone(),
                link: item.link.clone(),
                title: item.title.clone(),
                score: pick.score,
                saved_at: now,
                due_at,
                fermented: None,
                resolved_at: None,
            });
            report.enrolled += 1;
        }
    }
}

fn mature(
    state: WatchlistState,
    trend_terms: &[String],
    now: DateTime<Utc>,
    report: &mut TrackerReport,
) -> WatchlistState {
    let terms = normalize_terms(trend_terms);
    let WatchlistState {
        watching,
        mut done,
    } = state;

    let (due, still_watching): (Vec<_>, Vec<_>) =
        watching.into_iter().partition(|entry| entry.due_at <= now);

    for mut entry in due {
        let text = NormalizedText::from_parts(&entry.title, &entry.link);
        let fermented = text.blob_contains_any(&terms);
        if fermented {
            report.fermented += 1;
            report.fermented_links.push(entry.link.clone());
        }
        entry.fermented = Some(fermented);
        entry.resolved_at = Some(now);
        report.matured += 1;
        done.push(entry);
    }

    if done.len() > DONE_HISTORY_LIMIT {
        let excess = done.len() - DONE_HISTORY_LIMIT;
        done.drain(..excess);
        report.evicted = excess;
    }

    WatchlistState {
        watching: still_watching,
        done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{CandidateItem, ScoredCandidate, Topic};
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn pick(topic: &str, link: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            topic_id: topic.to_string(),
            topic_name: topic.to_uppercase(),
            score,
            item: Some(CandidateItem::new(format!("title {link}"), link, "", at(0))),
            base_hits: Vec::new(),
            radar_hits: Vec::new(),
            is_fallback: false,
        }
    }

    fn watching(link: &str, title: &str, due_at: DateTime<Utc>) -> WatchlistEntry {
        WatchlistEntry {
            topic_id: "semis".to_string(),
            link: link.to_string(),
            title: title.to_string(),
            score: 4.0,
            saved_at: at(0),
            due_at,
            fermented: None,
            resolved_at: None,
        }
    }

    #[test]
    fn overdue_entry_matching_trend_ferments() {
        let state = WatchlistState {
            watching: vec![watching("https://x.com/1", "TSMC expands in Arizona", at(1))],
            done: Vec::new(),
        };
        let tracker = DelayTracker::new(WatchPolicy::default());

        let (state, report) = tracker.advance(state, &PickSet::default(), &["tsmc".to_string()], at(2));

        assert!(state.watching.is_empty());
        assert_eq!(state.done.len(), 1);
        assert_eq!(state.done[0].fermented, Some(true));
        assert_eq!(state.done[0].resolved_at, Some(at(2)));
        assert_eq!(report.fermented_links, vec!["https://x.com/1"]);
    }

    #[test]
    fn entry_not_yet_due_keeps_watching() {
        let state = WatchlistState {
            watching: vec![watching("https://x.com/1", "TSMC", at(5))],
            done: Vec::new(),
        };
        let (state, report) = DelayTracker::new(WatchPolicy::default()).advance(
            state,
            &PickSet::default(),
            &["tsmc".to_string()],
            at(2),
        );
        assert_eq!(state.watching.len(), 1);
        assert_eq!(report.matured, 0);
    }

    #[test]
    fn due_entry_without_trend_match_is_not_fermented() {
        let state = WatchlistState {
            watching: vec![watching("https://x.com/1", "Quiet news", at(1))],
            done: Vec::new(),
        };
        let (state, report) =
            DelayTracker::new(WatchPolicy::default()).advance(state, &PickSet::default(), &[], at(2));
        assert_eq!(state.done[0].fermented, Some(false));
        assert_eq!(report.fermented, 0);
    }

    #[test]
    fn enrolls_strong_picks_once_across_runs() {
        let tracker = DelayTracker::new(WatchPolicy::default());
        let picks = PickSet::new(vec![pick("semis", "https://x.com/1", 4.0)]);

        let (state, first) = tracker.advance(WatchlistState::default(), &picks, &[], at(0));
        let (state, second) = tracker.advance(state, &picks, &[], at(1));

        assert_eq!(first.enrolled, 1);
        assert_eq!(second.enrolled, 0);
        assert_eq!(state.watching.len(), 1);
        assert_eq!(state.watching[0].due_at, at(0) + Duration::hours(48));
    }

    #[test]
    fn resolved_links_are_not_enrolled_again() {
        let tracker = DelayTracker::new(WatchPolicy::default());
        let state = WatchlistState {
            watching: vec![watching("https://x.com/1", "t", at(1))],
            done: Vec::new(),
        };
        let picks = PickSet::new(vec![pick("semis", "https://x.com/1", 4.0)]);

        let (state, report) = tracker.advance(state, &picks, &[], at(2));

        assert_eq!(report.matured, 1);
        assert_eq!(report.enrolled, 0);
        assert!(state.watching.is_empty());
        assert!(state.knows("https://x.com/1"));
    }

    #[test]
    fn skips_weak_fallback_and_placeholder_picks() {
        let mut fallback = pick("semis", "https://x.com/2", 9.0);
        fallback.is_fallback = true;
        let picks = PickSet::new(vec![
            pick("semis", "https://x.com/1", 2.9),
            fallback,
            ScoredCandidate::placeholder(&Topic::new("bank", "Bank", &["bank"])),
        ]);
        let (state, report) =
            DelayTracker::new(WatchPolicy::default()).advance(WatchlistState::default(), &picks, &[], at(0));
        assert_eq!(report.enrolled, 0);
        assert!(state.watching.is_empty());
    }

    #[test]
    fn caps_enrollment_per_topic() {
        let picks = PickSet::new(vec![
            pick("semis", "https://x.com/1", 5.0),
            pick("semis", "https://x.com/2", 5.0),
            pick("semis", "https://x.com/3", 5.0),
            pick("bank", "https://x.com/4", 5.0),
        ]);
        let (state, report) =
            DelayTracker::new(WatchPolicy::default()).advance(WatchlistState::default(), &picks, &[], at(0));
        assert_eq!(report.enrolled, 3);
        let semis = state.watching.iter().filter(|e| e.topic_id == "semis").count();
        assert_eq!(semis, 2);
    }

    #[test]
    fn disabled_policy_only_matures() {
        let policy = WatchPolicy {
            enabled: false,
            ..WatchPolicy::default()
        };
        let state = WatchlistState {
            watching: vec![watching("https://x.com/1", "t", at(1))],
            done: Vec::new(),
        };
        let picks = PickSet::new(vec![pick("semis", "https://x.com/9", 5.0)]);
        let (state, report) = DelayTracker::new(policy).advance(state, &picks, &[], at(2));
        assert_eq!(report.matured, 1);
        assert_eq!(report.enrolled, 0);
        assert!(state.watching.is_empty());
    }

    #[test]
    fn done_history_keeps_most_recent() {
        let done: Vec<WatchlistEntry> = (0..DONE_HISTORY_LIMIT)
            .map(|i| {
                let mut entry = watching(&format!("https://old.com/{i}"), "t", at(0));
                entry.fermented = Some(false);
                entry.resolved_at = Some(at(0));
                entry
            })
            .collect();
        let state = WatchlistState {
            watching: vec![watching("https://new.com/1", "t", at(1))],
            done,
        };

        let (state, report) =
            DelayTracker::new(WatchPolicy::default()).advance(state, &PickSet::default(), &[], at(2));

        assert_eq!(state.done.len(), DONE_HISTORY_LIMIT);
        assert_eq!(report.evicted, 1);
        assert_eq!(state.done[0].link, "https://old.com/1");
        assert_eq!(state.done[DONE_HISTORY_LIMIT - 1].link, "https://new.com/1");
    }

    #[test]
    fn unrepresentable_delay_skips_enrollment() {
        let policy = WatchPolicy {
            delay_hours: 10_000_000_000,
            ..WatchPolicy::default()
        };
        let picks = PickSet::new(vec![pick("semis", "https://x.com/1", 9.0)]);

        let (state, report) =
            DelayTracker::new(policy).advance(WatchlistState::default(), &picks, &[], at(0));

        assert!(state.watching.is_empty());
        assert_eq!(report.enrolled, 0);
    }

    #[test]
    fn state_round_trips_through_json() {
        let state = WatchlistState {
            watching: vec![watching("https://x.com/1", "t", at(1))],
            done: Vec::new(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert!(json["watching"][0].get("fermented").is_none());
        let parsed: WatchlistState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);
    }
}
