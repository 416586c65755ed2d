//! Rule-based entity extraction
//!
//! Runs on the raw message (sanitization would strip `@`, `:` and `/`).
//! Independent of any model generation.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;

use crate::models::{Entity, EntityKind};

/// Patterns in priority order; an earlier kind wins a tie on identical spans
static PATTERNS: Lazy<Vec<(EntityKind, Regex)>> = Lazy::new(|| {
    [
        (
            EntityKind::Email,
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}",
        ),
        (EntityKind::Url, r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#),
        (
            EntityKind::IpAddress,
            r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
        ),
        (
            EntityKind::PhoneNumber,
            r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b",
        ),
        (
            EntityKind::MoneyAmount,
            r"(?i)[$€£]\s?\d[\d,]*(?:\.\d{1,2})?|\b\d[\d,]*(?:\.\d{1,2})?\s?(?:dollars|usd|eur|euros|pounds)\b",
        ),
        (
            EntityKind::TimeOfDay,
            r"(?i)\b(?:(?:[01]?\d|2[0-3]):[0-5]\d(?:\s?[ap]m)?|(?:1[0-2]|0?[1-9])\s?[ap]m)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| match Regex::new(pattern) {
        Ok(regex) => Some((kind, regex)),
        Err(e) => {
            tracing::error!(?kind, error = %e, "Invalid entity pattern, kind disabled");
            None
        }
    })
    .collect()
});

/// Characters that end a sentence rather than a URL
const URL_TRAILING: &[char] = &['.', ',', '!', '?', ';', ':', ')', ']', '}'];

/// Find non-overlapping entities in `text`, ordered by position
///
/// Where matches overlap, the earliest start wins, then the longest span.
pub fn extract_entities(text: &str) -> Vec<Entity> {
    let mut candidates: Vec<(usize, Entity)> = Vec::new();

    for (priority, (kind, regex)) in PATTERNS.iter().enumerate() {
        for m in regex.find_iter(text) {
            let mut matched = m.as_str();
            if *kind == EntityKind::Url {
                matched = matched.trim_end_matches(URL_TRAILING);
            }
            if matched.is_empty() {
                continue;
            }
            candidates.push((
                priority,
                Entity {
                    kind: *kind,
                    text: matched.to_string(),
                    start: m.start(),
                    end: m.start() + matched.len(),
                },
            ));
        }
    }

    candidates.sort_by_key(|(priority, e)| (e.start, Reverse(e.end - e.start), *priority));

    let mut entities: Vec<Entity> = Vec::with_capacity(candidates.len());
    for (_, entity) in candidates {
        if entities.last().map_or(true, |last| entity.start >= last.end) {
            entities.push(entity);
        }
    }
    entities
}
