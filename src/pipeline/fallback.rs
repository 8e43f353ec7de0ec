//! Relaxed single-pick strategies for topics the strict ranking starves.
//!
//! The policy is declared per topic in the digest configuration and resolved
//! into [`FallbackPolicy`] at load time.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::guard::{Guard, hits_forbidden};
use super::normalize::{NormalizedText, normalize_term, normalize_terms};
use super::types::CandidateItem;

/// Score assigned to every fallback pick.
///
/// Entries at or below this value form the fallback/placeholder tier.
pub const FALLBACK_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackPolicy {
    #[default]
    None,
    /// Accept an item published on one of the listed domains or their subdomains.
    OfficialSourceOnly { allow_domains: Vec<String> },
    /// Accept an item mentioning at least one entity and one context term.
    ContextCoOccurrence {
        entities: Vec<String>,
        contexts: Vec<String>,
    },
}

impl FallbackPolicy {
    /// Short label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::OfficialSourceOnly { .. } => "official_source_only",
            Self::ContextCoOccurrence { .. } => "context_co_occurrence",
        }
    }

    /// Index of the first unused pool item the policy accepts.
    ///
    /// `texts` is parallel to `items`. Items hitting a forbidden guard term are
    /// never returned.
    #[must_use]
    pub fn select(
        &self,
        items: &[CandidateItem],
        texts: &[NormalizedText],
        used_links: &HashSet<String>,
        guard: Option<&Guard>,
    ) -> Option<usize> {
        let accepts: Box<dyn Fn(&CandidateItem, &NormalizedText) -> bool> = match self {
            Self::None => return None,
            Self::OfficialSourceOnly { allow_domains } => {
                let domains: Vec<String> = allow_domains
                    .iter()
                    .filter_map(|domain| normalize_domain(domain))
                    .collect();
                if domains.is_empty() {
                    return None;
                }
                Box::new(move |item, _| link_on_domains(&item.link, &domains))
            }
            Self::ContextCoOccurrence { entities, contexts } => {
                let entities = normalize_terms(entities);
                let contexts = normalize_terms(contexts);
                if entities.is_empty() || contexts.is_empty() {
                    return None;
                }
                Box::new(move |_, text| {
                    text.blob_contains_any(&entities) && text.blob_contains_any(&contexts)
                })
            }
        };

        items
            .iter()
            .zip(texts)
            .position(|(item, text)| {
                !used_links.contains(&item.link)
                    && !guard.is_some_and(|guard| hits_forbidden(text, guard))
                    && accepts(item, text)
            })
    }
}

fn normalize_domain(domain: &str) -> Option<String> {
    normalize_term(domain).map(|d| d.trim_start_matches('.').trim_end_matches('.').to_string())
}

fn link_on_domains(link: &str, domains: &[String]) -> bool {
    let Some(host) = extract_host(link) else {
        return false;
    };
    domains.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Lowercased host of an absolute http(s) link.
pub(crate) fn extract_host(link: &str) -> Option<String> {
    let link = link.trim();
    let without_scheme = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"))?;

    let authority = without_scheme.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = host_port.split(':').next()?.trim_end_matches('.');

    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}
