//! Renders a pick set into the plain-text message pushed to subscribers.

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::normalize::clean_markup;
use super::types::{PickSet, ScoredCandidate};
use crate::util::text::{shorten, truncate_chars};

/// Width of the shortened summary line.
pub const SUMMARY_WIDTH: usize = 120;

const RULE: &str = "━━━━━━━━━━━━━━";

/// Who the message is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Scheduled daily push to every subscriber.
    #[default]
    Daily,
    /// First digest pushed to a new follower.
    Welcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestFormat {
    pub title: String,
    /// Hard cap on the rendered message, in characters.
    pub max_chars: usize,
}

impl Default for DigestFormat {
    fn default() -> Self {
        Self {
            title: "Daily Digest".to_string(),
            max_chars: 4900,
        }
    }
}

#[must_use]
pub fn format_digest(
    picks: &PickSet,
    date: NaiveDate,
    audience: Audience,
    format: &DigestFormat,
) -> String {
    let mut out = String::new();
    let item_count = picks.item_count();

    if audience == Audience::Welcome {
        out.push_str("Thanks for subscribing! Here is the latest digest to get you started.\n\n");
    }
    let _ = writeln!(out, "{}", format.title);
    let _ = writeln!(out, "{}", date.format("%Y-%m-%d"));
    out.push('\n');
    let _ = writeln!(
        out,
        "{item_count} {} worth a look today:",
        if item_count == 1 { "item" } else { "items" }
    );
    out.push('\n');

    let mut sources = Vec::new();
    for (index, entry) in picks.iter().enumerate() {
        let number = index + 1;
        render_entry(&mut out, number, entry);
        if let Some(link) = entry.link() {
            sources.push(format!("[{number}] {link}"));
        }
    }

    if !sources.is_empty() {
        let _ = writeln!(out, "{RULE}");
        out.push_str("Sources:\n");
        out.push_str(&sources.join("\n"));
    }

    let trimmed = out.trim_end();
    truncate_chars(trimmed, format.max_chars).to_string()
}

fn render_entry(out: &mut String, number: usize, entry: &ScoredCandidate) {
    let Some(item) = entry.item.as_ref() else {
        let _ = writeln!(out, "{number}. {}: no qualifying item today", entry.topic_name);
        out.push('\n');
        return;
    };

    let title = clean_markup(&item.title);
    if entry.is_fallback {
        let _ = writeln!(out, "{number}. {title} (unconfirmed)");
    } else {
        let _ = writeln!(out, "{number}. {title}");
    }
    let _ = writeln!(out, "   Topic: {}", entry.topic_name);

    let summary = clean_markup(&item.summary);
    if summary.is_empty() {
        out.push_str("   (no summary, open the source for details)\n");
    } else {
        let _ = writeln!(out, "   {}", shorten(&summary, SUMMARY_WIDTH));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{CandidateItem, Topic};
    use chrono::Utc;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn entry(topic: &str, title: &str, link: &str, summary: &str) -> ScoredCandidate {
        ScoredCandidate {
            topic_id: topic.to_lowercase(),
            topic_name: topic.to_string(),
            score: 2.0,
            item: Some(CandidateItem::new(title, link, summary, Utc::now())),
            base_hits: Vec::new(),
            radar_hits: Vec::new(),
            is_fallback: false,
        }
    }

    #[test]
    fn renders_entries_placeholders_and_sources() {
        let picks = PickSet::new(vec![
            entry("AI", "Model released", "https://a.com/1", "<p>A new model</p>"),
            ScoredCandidate::placeholder(&Topic::new("acct", "Accounting", &["ifrs"])),
        ]);

        let text = format_digest(&picks, date(), Audience::Daily, &DigestFormat::default());

        assert!(text.starts_with("Daily Digest\n2026-03-01\n\n1 item worth a look today:"));
        assert!(text.contains("1. Model released\n   Topic: AI\n   A new model\n"));
        assert!(text.contains("2. Accounting: no qualifying item today"));
        assert!(text.ends_with("Sources:\n[1] https://a.com/1"));
    }

    #[test]
    fn flags_fallback_and_missing_summary() {
        let mut fallback = entry("Policy", "Ministry notice", "https://gov.tw/1", "");
        fallback.is_fallback = true;
        let text = format_digest(
            &PickSet::new(vec![fallback]),
            date(),
            Audience::Daily,
            &DigestFormat::default(),
        );
        assert!(text.contains("1. Ministry notice (unconfirmed)"));
        assert!(text.contains("(no summary, open the source for details)"));
    }

    #[test]
    fn shortens_long_summaries() {
        let summary = "word ".repeat(100);
        let text = format_digest(
            &PickSet::new(vec![entry("AI", "t", "https://a.com/1", &summary)]),
            date(),
            Audience::Daily,
            &DigestFormat::default(),
        );
        let line = text
            .lines()
            .find(|line| line.trim_start().starts_with("word"))
            .unwrap();
        assert!(line.trim().chars().count() <= SUMMARY_WIDTH);
        assert!(line.ends_with('…'));
    }

    #[test]
    fn welcome_has_greeting() {
        let text = format_digest(
            &PickSet::default(),
            date(),
            Audience::Welcome,
            &DigestFormat::default(),
        );
        assert!(text.starts_with("Thanks for subscribing!"));
        assert!(text.contains("0 items worth a look today:"));
        assert!(!text.contains("Sources:"));
    }

    #[test]
    fn truncates_to_max_chars() {
        let entries = (0..50)
            .map(|i| entry("AI", &format!("headline {i}"), &format!("https://a.com/{i}"), "x"))
            .collect();
        let format = DigestFormat {
            title: "Digest".to_string(),
            max_chars: 200,
        };
        let text = format_digest(&PickSet::new(entries), date(), Audience::Daily, &format);
        assert_eq!(text.chars().count(), 200);
    }
}
