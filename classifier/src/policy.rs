//! Per-category cache lifetimes and accepted labels.

use dialogue_core::CacheCategory;
use sha2::{Digest, Sha256};
use std::time::Duration;

const QUESTION_LABELS: &[&str] = &["factual", "philosophical", "problem_solving", "sensitive"];
const LEAD_STATE_LABELS: &[&str] = &["greeting", "fact_finding", "problem_solving", "closing"];

/// Words that never change a classification and are dropped before keying.
const STOP_WORDS: &[&str] = &["а", "и", "но", "да", "же", "ну", "вот", "это", "то"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub ttl: Duration,
    /// Hot categories are written straight into tier 1.
    pub hot: bool,
    /// Labels a model answer may take for this category.
    pub labels: &'static [&'static str],
    /// Label used when a model answer is not in `labels`.
    pub fallback: &'static str,
}

const HOUR: u64 = 3600;

pub fn policy(category: CacheCategory) -> CategoryPolicy {
    match category {
        CacheCategory::Factual => CategoryPolicy {
            ttl: Duration::from_secs(24 * HOUR),
            hot: true,
            labels: QUESTION_LABELS,
            fallback: "factual",
        },
        CacheCategory::ProblemSolving => CategoryPolicy {
            ttl: Duration::from_secs(4 * HOUR),
            hot: false,
            labels: QUESTION_LABELS,
            fallback: "factual",
        },
        CacheCategory::Philosophical => CategoryPolicy {
            ttl: Duration::from_secs(2 * HOUR),
            hot: false,
            labels: QUESTION_LABELS,
            fallback: "factual",
        },
        CacheCategory::Sensitive => CategoryPolicy {
            ttl: Duration::from_secs(HOUR / 2),
            hot: false,
            labels: QUESTION_LABELS,
            fallback: "factual",
        },
        CacheCategory::LeadState => CategoryPolicy {
            ttl: Duration::from_secs(4 * HOUR),
            hot: true,
            labels: LEAD_STATE_LABELS,
            fallback: "greeting",
        },
    }
}

/// Lowercases, collapses whitespace and drops stop words.
pub fn normalize_input(input: &str) -> String {
    input
        .to_lowercase()
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cache key for an input under a category: `<category>:<hash prefix>`.
pub fn cache_key(input: &str, category: CacheCategory) -> String {
    let normalized = normalize_input(input);
    let mut hasher = Sha256::new();
    hasher.update(category.as_ref().as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    let hash = hex::encode(hasher.finalize());
    format!("{}:{}", category, &hash[..16])
}

/// Accepts a model answer if, trimmed and lowercased, it is a label of the
/// category. Otherwise returns the category's fallback label.
pub fn validate_label(raw: &str, category: CacheCategory) -> (String, bool) {
    let policy = policy(category);
    let candidate = raw.trim().trim_matches(|c: char| c == '"' || c == '.').to_lowercase();
    if policy.labels.contains(&candidate.as_str()) {
        (candidate, true)
    } else {
        (policy.fallback.to_string(), false)
    }
}

/// Category whose lifetime and tier placement a cached label follows.
///
/// A question label is kept under its own category, so a `sensitive` answer
/// expires like any sensitive entry whatever category was asked for. Lead
/// state labels stay under [`CacheCategory::LeadState`].
pub fn retention_category(label: &str, requested: CacheCategory) -> CacheCategory {
    if requested == CacheCategory::LeadState {
        return requested;
    }
    label
        .parse::<CacheCategory>()
        .ok()
        .filter(|category| *category != CacheCategory::LeadState)
        .unwrap_or(requested)
}
