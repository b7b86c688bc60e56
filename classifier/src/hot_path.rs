//! Instant answers for short, very common messages.

use crate::telemetry::CacheTelemetry;
use config::HotPathConfig;
use dialogue_core::CacheCategory;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

const REPORT_EVERY: u64 = 100;
const REPORT_TOP: usize = 10;

/// (name, pattern, label, label when classifying lead state)
const PATTERNS: &[(&str, &str, &str, Option<&str>)] = &[
    (
        "greeting",
        r"(?i)^\s*(привет|приветствую|здравствуй(те)?|добрый\s+(день|вечер)|доброе\s+утро|hi|hello|hey)[\s!.,)]*$",
        "greeting",
        Some("greeting"),
    ),
    (
        "thanks",
        r"(?i)^\s*(спасибо|благодарю|thanks|thank\s+you)(\s+(большое|огромное))?[\s!.,)]*$",
        "thanks",
        None,
    ),
    (
        "farewell",
        r"(?i)^\s*(пока|до\s+свидания|всего\s+доброго|bye|goodbye)[\s!.,)]*$",
        "farewell",
        None,
    ),
    (
        "affirmative",
        r"(?i)^\s*(да|ок|окей|хорошо|ладно|понятно|yes|ok|okay)[\s!.,)]*$",
        "affirmative",
        None,
    ),
    (
        "negative",
        r"(?i)^\s*(нет|не\s+надо|no)[\s!.,)]*$",
        "negative",
        None,
    ),
];

struct HotPattern {
    name: &'static str,
    regex: Regex,
    label: &'static str,
    lead_state: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotPathMatch {
    pub pattern: &'static str,
    pub value: &'static str,
}

pub struct HotPathClassifier {
    patterns: Vec<HotPattern>,
    enabled: bool,
    max_words: usize,
    frequency: Mutex<HashMap<String, u64>>,
    frequency_capacity: usize,
    matches: AtomicU64,
    telemetry: CacheTelemetry,
}

impl HotPathClassifier {
    pub fn new(config: &HotPathConfig) -> Self {
        let patterns = PATTERNS
            .iter()
            .filter_map(|(name, pattern, label, lead_state)| {
                Regex::new(pattern).ok().map(|regex| HotPattern {
                    name,
                    regex,
                    label,
                    lead_state: *lead_state,
                })
            })
            .collect();

        Self {
            patterns,
            enabled: config.enabled,
            max_words: config.max_words,
            frequency: Mutex::new(HashMap::new()),
            frequency_capacity: config.frequency_capacity.max(1),
            matches: AtomicU64::new(0),
            telemetry: CacheTelemetry::new(),
        }
    }

    /// Matches only inputs of at most `max_words` words.
    pub fn classify(&self, input: &str, category: CacheCategory) -> Option<HotPathMatch> {
        if !self.enabled || input.split_whitespace().count() > self.max_words {
            return None;
        }

        let pattern = self.patterns.iter().find(|p| p.regex.is_match(input))?;
        let value = match category {
            CacheCategory::LeadState => pattern.lead_state?,
            _ => pattern.label,
        };

        self.track(input);
        self.telemetry.record_hot_path_match(pattern.name);
        Some(HotPathMatch {
            pattern: pattern.name,
            value,
        })
    }

    /// Most frequently matched inputs, most frequent first.
    pub fn top_patterns(&self, n: usize) -> Vec<(String, u64)> {
        let frequency = self.frequency.lock();
        let mut ranked: Vec<(String, u64)> = frequency
            .iter()
            .map(|(input, count)| (input.clone(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    pub fn total_matches(&self) -> u64 {
        self.matches.load(Ordering::Relaxed)
    }

    fn track(&self, input: &str) {
        let normalized = input.trim().to_lowercase();
        {
            let mut frequency = self.frequency.lock();
            *frequency.entry(normalized).or_insert(0) += 1;
            if frequency.len() > self.frequency_capacity {
                trim_least_frequent(&mut frequency, self.frequency_capacity);
            }
        }

        let total = self.matches.fetch_add(1, Ordering::Relaxed) + 1;
        if total % REPORT_EVERY == 0 {
            tracing::info!(
                total_matches = total,
                top = ?self.top_patterns(REPORT_TOP),
                "Popular hot path inputs"
            );
        }
    }
}

/// Shrinks to nine tenths of `capacity`, dropping the least frequent first.
fn trim_least_frequent(frequency: &mut HashMap<String, u64>, capacity: usize) {
    let keep = capacity - capacity / 10;
    let mut ranked: Vec<(u64, String)> = frequency
        .iter()
        .map(|(input, count)| (*count, input.clone()))
        .collect();
    ranked.sort_unstable();
    let excess = frequency.len().saturating_sub(keep);
    for (_, input) in ranked.into_iter().take(excess) {
        frequency.remove(&input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> HotPathClassifier {
        HotPathClassifier::new(&HotPathConfig::default())
    }

    #[test]
    fn test_common_inputs_match() {
        let hot = classifier();
        let cases = [
            ("Привет!", "greeting"),
            ("добрый день", "greeting"),
            ("Спасибо большое", "thanks"),
            ("до свидания", "farewell"),
            ("ok", "affirmative"),
            ("Нет.", "negative"),
        ];
        for (input, expected) in cases {
            let matched = hot.classify(input, CacheCategory::Factual);
            assert_eq!(matched.map(|m| m.value), Some(expected), "{input}");
        }
    }

    #[test]
    fn test_long_input_is_not_considered() {
        let hot = classifier();
        assert!(hot.classify("привет", CacheCategory::Factual).is_some());
        assert!(
            hot.classify("привет подскажите пожалуйста сколько стоит курс", CacheCategory::Factual)
                .is_none()
        );
    }

    #[test]
    fn test_partial_text_does_not_match() {
        let hot = classifier();
        assert!(hot.classify("привет, сколько стоит?", CacheCategory::Factual).is_none());
    }

    #[test]
    fn test_lead_state_only_maps_greeting() {
        let hot = classifier();
        assert_eq!(
            hot.classify("Здравствуйте", CacheCategory::LeadState).map(|m| m.value),
            Some("greeting")
        );
        assert!(hot.classify("спасибо", CacheCategory::LeadState).is_none());
    }

    #[test]
    fn test_disabled_never_matches() {
        let hot = HotPathClassifier::new(&HotPathConfig {
            enabled: false,
            ..HotPathConfig::default()
        });
        assert!(hot.classify("привет", CacheCategory::Factual).is_none());
    }

    #[test]
    fn test_top_patterns_ranked_by_frequency() {
        let hot = classifier();
        for _ in 0..3 {
            hot.classify("спасибо", CacheCategory::Factual);
        }
        hot.classify("привет", CacheCategory::Factual);

        let top = hot.top_patterns(2);
        assert_eq!(top[0], ("спасибо".to_string(), 3));
        assert_eq!(top[1], ("привет".to_string(), 1));
        assert_eq!(hot.total_matches(), 4);
    }

    #[test]
    fn test_frequency_table_is_bounded() {
        let hot = HotPathClassifier::new(&HotPathConfig {
            frequency_capacity: 10,
            ..HotPathConfig::default()
        });
        for _ in 0..5 {
            hot.classify("спасибо", CacheCategory::Factual);
        }
        let inputs = ["привет", "hi", "hello", "hey", "пока", "bye", "да", "ок", "ладно", "нет", "no"];
        for input in inputs {
            hot.classify(input, CacheCategory::Factual);
        }

        let frequency = hot.frequency.lock();
        assert!(frequency.len() <= 10);
        assert_eq!(frequency.get("спасибо"), Some(&5));
    }
}
