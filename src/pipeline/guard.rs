//! Per-topic hard include/exclude gate.
//!
//! Matching is plain case-insensitive substring containment on the blob, not
//! token matching: a short forbidden term also matches inside longer words.

use serde::{Deserialize, Serialize};

use super::normalize::{NormalizedText, normalize_terms};
use super::types::CandidateItem;

/// Required and forbidden terms of a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    /// At least one of these must occur (ignored when empty).
    #[serde(default)]
    pub must_include_any: Vec<String>,
    /// None of these may occur.
    #[serde(default)]
    pub must_not_include_any: Vec<String>,
}

impl Guard {
    /// Copy with every term folded and blank terms removed.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            must_include_any: normalize_terms(&self.must_include_any),
            must_not_include_any: normalize_terms(&self.must_not_include_any),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        normalize_terms(&self.must_include_any).is_empty()
            && normalize_terms(&self.must_not_include_any).is_empty()
    }
}

/// Evaluates the guard of a topic against a raw item.
#[must_use]
pub fn guard_pass(item: &CandidateItem, guard: Option<&Guard>) -> bool {
    guard_pass_text(&NormalizedText::from_item(item), guard)
}

/// Same as [`guard_pass`] on an already normalized item.
#[must_use]
pub fn guard_pass_text(text: &NormalizedText, guard: Option<&Guard>) -> bool {
    let Some(guard) = guard else {
        return true;
    };

    let required = normalize_terms(&guard.must_include_any);
    if !required.is_empty() && !text.blob_contains_any(&required) {
        return false;
    }

    !hits_forbidden(text, guard)
}

/// True when any forbidden term occurs in the blob.
#[must_use]
pub fn hits_forbidden(text: &NormalizedText, guard: &Guard) -> bool {
    text.blob_contains_any(&normalize_terms(&guard.must_not_include_any))
}
