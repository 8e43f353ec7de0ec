//! Item text normalization.
//!
//! Every matcher in the engine works on the same folded text: NFC-normalized,
//! lowercased, markup stripped, whitespace collapsed. Normalization is total;
//! missing fields simply contribute nothing.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

use super::types::CandidateItem;

static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("markup tag pattern is valid"));

static NUMERIC_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:x([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("entity pattern is valid")
});

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&hellip;", "…"),
    ("&amp;", "&"),
];

/// Folded title and title+summary blob of one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    pub title: String,
    pub blob: String,
}

impl NormalizedText {
    #[must_use]
    pub fn from_item(item: &CandidateItem) -> Self {
        Self::from_parts(&item.title, &item.summary)
    }

    #[must_use]
    pub fn from_parts(title: &str, summary: &str) -> Self {
        let title = fold(&clean_markup(title));
        let summary = fold(&clean_markup(summary));
        let blob = match (title.is_empty(), summary.is_empty()) {
            (_, true) => title.clone(),
            (true, false) => summary,
            (false, false) => format!("{title} {summary}"),
        };
        Self { title, blob }
    }

    /// Plain substring containment of any normalized term in the blob.
    #[must_use]
    pub fn blob_contains_any(&self, terms: &[String]) -> bool {
        terms.iter().any(|term| self.blob.contains(term.as_str()))
    }
}

/// Strips tags, decodes common entities and collapses whitespace.
///
/// Case is preserved so the result can also be shown to readers.
#[must_use]
pub fn clean_markup(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let without_tags = MARKUP_TAG.replace_all(raw, " ");
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased, trimmed form of a configured term; `None` for blank terms.
#[must_use]
pub fn normalize_term(term: &str) -> Option<String> {
    let folded = fold(term.trim());
    if folded.is_empty() { None } else { Some(folded) }
}

/// Normalizes a term list, dropping blanks.
#[must_use]
pub fn normalize_terms(terms: &[String]) -> Vec<String> {
    terms.iter().filter_map(|term| normalize_term(term)).collect()
}

fn fold(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &Captures<'_>| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            (None, None) => None,
        };
        code.and_then(char::from_u32)
            .map_or_else(|| caps[0].to_string(), |c| c.to_string())
    });
    let mut decoded = numeric.into_owned();
    for (entity, replacement) in NAMED_ENTITIES {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, replacement);
        }
    }
    decoded
}
