//! Sequence hints: which cache key tends to follow a pair of keys.

use std::collections::{HashMap, VecDeque};

/// Only triples inside this many most recent keys produce hints.
const HINT_SPAN: usize = 10;

type Pattern = (String, String);

#[derive(Debug)]
pub struct PredictionIndex {
    recent: VecDeque<String>,
    window: usize,
    followers: HashMap<Pattern, VecDeque<String>>,
    /// Patterns in insertion order, oldest first.
    order: VecDeque<Pattern>,
    max_patterns: usize,
    max_per_pattern: usize,
}

impl PredictionIndex {
    pub fn new(window: usize, max_patterns: usize, max_per_pattern: usize) -> Self {
        Self {
            recent: VecDeque::new(),
            window: window.max(3),
            followers: HashMap::new(),
            order: VecDeque::new(),
            max_patterns: max_patterns.max(1),
            max_per_pattern: max_per_pattern.max(1),
        }
    }

    pub fn record(&mut self, key: &str) {
        self.recent.push_back(key.to_string());
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }

        let start = self.recent.len().saturating_sub(HINT_SPAN);
        let tail: Vec<String> = self.recent.iter().skip(start).cloned().collect();
        for triple in tail.windows(3) {
            self.add_hint(&triple[0], &triple[1], &triple[2]);
        }
    }

    /// Keys seen after the two most recent ones, oldest observation first.
    pub fn predict_next(&self) -> Vec<String> {
        let len = self.recent.len();
        if len < 2 {
            return Vec::new();
        }
        self.predict_after(&self.recent[len - 2], &self.recent[len - 1])
    }

    pub fn predict_after(&self, first: &str, second: &str) -> Vec<String> {
        self.followers
            .get(&(first.to_string(), second.to_string()))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pattern_count(&self) -> usize {
        self.followers.len()
    }

    pub fn clear(&mut self) {
        self.recent.clear();
        self.followers.clear();
        self.order.clear();
    }

    fn add_hint(&mut self, first: &str, second: &str, next: &str) {
        let pattern = (first.to_string(), second.to_string());

        if !self.followers.contains_key(&pattern) {
            while self.followers.len() >= self.max_patterns {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.followers.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.order.push_back(pattern.clone());
        }

        let keys = self.followers.entry(pattern).or_default();
        if keys.iter().any(|k| k == next) {
            return;
        }
        keys.push_back(next.to_string());
        while keys.len() > self.max_per_pattern {
            keys.pop_front();
        }
    }
}
