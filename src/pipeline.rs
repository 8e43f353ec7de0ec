//! Topic selection engine.
//!
//! Turns a pool of deduplicated candidate items into the day's digest picks.
//! Every stage is a pure function; the service layer owns all I/O.
//!
//! ## Stages
//!
//! 1. **Normalization** (`normalize.rs`) - builds the lowercase, markup-free
//!    text blob every matcher works on.
//! 2. **Guard** (`guard.rs`) - hard include/exclude gate per topic.
//! 3. **Scoring** (`scoring.rs`) - keyword tiers plus trend (radar) boosts.
//! 4. **Ranking** (`ranking.rs`) - per-topic admitted candidates, best first.
//! 5. **Fallback** (`fallback.rs`) - relaxed single pick for starved topics.
//! 6. **Allocation** (`allocate.rs`) - per-topic floor, then global fill.
//! 7. **Watchlist** (`watchlist.rs`) - delayed trend confirmation of picks.
//!
//! `format.rs` renders an allocation into the pushed message text.

pub mod allocate;
pub mod fallback;
pub mod format;
pub mod guard;
pub mod normalize;
pub mod ranking;
pub mod scoring;
pub mod types;
pub mod watchlist;

pub use allocate::{Allocation, AllocationParams, AllocationStats, allocate};
pub use fallback::{FALLBACK_SCORE, FallbackPolicy};
pub use format::{Audience, DigestFormat, format_digest};
pub use guard::{Guard, guard_pass};
pub use normalize::NormalizedText;
pub use ranking::{RankedCandidate, RankedTopic, rank_topic, rank_topics};
pub use scoring::{ScoreOutcome, score_item};
pub use types::{CandidateItem, PickSet, ScoredCandidate, Topic, TrendTerms};
pub use watchlist::{DelayTracker, TrackerReport, WatchPolicy, WatchlistEntry, WatchlistState};
