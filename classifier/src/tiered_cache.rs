//! # Tiered Classification Cache
//!
//! Two in-process tiers keyed by [`cache_key`](crate::policy::cache_key):
//!
//! - tier 1: small LRU for hot entries, re-promoted on every hit
//! - tier 2: larger map, evicting the oldest fifth when over capacity
//!
//! Entries expire by the category they were stored under (see [`policy`]).
//! An expired entry is removed on lookup and counts as a miss. Tier 1,
//! tier 2 and the prediction index each sit behind their own lock, and no
//! two are held at once.

use crate::policy::policy;
use crate::prediction::PredictionIndex;
use crate::telemetry::CacheTelemetry;
use config::CacheConfig;
use dialogue_core::CacheCategory;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    stored_at: Instant,
    category: CacheCategory,
}

impl CacheEntry {
    fn new(value: String, category: CacheCategory) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            category,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < policy(self.category).ttl
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheEfficiency {
    pub total_requests: u64,
    pub tier1_hit_rate: f64,
    pub tier2_hit_rate: f64,
    pub miss_rate: f64,
    pub tier1_size: usize,
    pub tier1_capacity: usize,
    pub tier2_size: usize,
    pub tier2_capacity: usize,
    pub expired: u64,
    pub evictions: u64,
    pub prediction_patterns: usize,
}

pub struct TieredClassificationCache {
    tier1: Mutex<LruCache<String, CacheEntry>>,
    tier2: Mutex<HashMap<String, CacheEntry>>,
    tier2_capacity: usize,
    predictions: Mutex<PredictionIndex>,
    tier1_hits: AtomicU64,
    tier2_hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
    telemetry: CacheTelemetry,
}

impl TieredClassificationCache {
    pub fn new(config: &CacheConfig) -> Self {
        let tier1_capacity = NonZeroUsize::new(config.tier1_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            tier1: Mutex::new(LruCache::new(tier1_capacity)),
            tier2: Mutex::new(HashMap::new()),
            tier2_capacity: config.tier2_capacity.max(1),
            predictions: Mutex::new(PredictionIndex::new(
                config.prediction_window,
                config.max_patterns,
                config.max_predictions_per_pattern,
            )),
            tier1_hits: AtomicU64::new(0),
            tier2_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            telemetry: CacheTelemetry::new(),
        }
    }

    pub fn get(&self, key: &str, category: CacheCategory) -> Option<String> {
        self.get_at(key, category, Instant::now())
    }

    fn get_at(&self, key: &str, category: CacheCategory, now: Instant) -> Option<String> {
        {
            let mut tier1 = self.tier1.lock();
            if let Some(entry) = tier1.get(key) {
                if entry.is_fresh(now) {
                    let value = entry.value.clone();
                    drop(tier1);
                    self.tier1_hits.fetch_add(1, Ordering::Relaxed);
                    self.telemetry.record_hit("tier1", category);
                    return Some(value);
                }
                tier1.pop(key);
                self.expired.fetch_add(1, Ordering::Relaxed);
            }
        }

        let promoted = {
            let mut tier2 = self.tier2.lock();
            match tier2.get(key) {
                Some(entry) if entry.is_fresh(now) => Some(entry.clone()),
                Some(_) => {
                    tier2.remove(key);
                    self.expired.fetch_add(1, Ordering::Relaxed);
                    None
                }
                None => None,
            }
        };

        match promoted {
            Some(entry) => {
                let value = entry.value.clone();
                self.tier1.lock().put(key.to_string(), entry);
                self.tier2_hits.fetch_add(1, Ordering::Relaxed);
                self.telemetry.record_hit("tier2", category);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.telemetry.record_miss(category);
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: impl Into<String>, category: CacheCategory) {
        let entry = CacheEntry::new(value.into(), category);

        {
            let mut tier2 = self.tier2.lock();
            tier2.insert(key.to_string(), entry.clone());
            if tier2.len() > self.tier2_capacity {
                let evicted = evict_oldest_fifth(&mut tier2);
                self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                self.telemetry.record_evictions(evicted);
                tracing::debug!(evicted, remaining = tier2.len(), "Evicted oldest tier-2 entries");
            }
        }

        if policy(category).hot {
            self.tier1.lock().put(key.to_string(), entry);
        }

        self.predictions.lock().record(key);
    }

    /// Keys that previously followed the two most recent writes.
    pub fn predict_next(&self) -> Vec<String> {
        self.predictions.lock().predict_next()
    }

    /// Drops expired entries from both tiers. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let from_tier1 = {
            let mut tier1 = self.tier1.lock();
            let stale: Vec<String> = tier1
                .iter()
                .filter(|(_, entry)| !entry.is_fresh(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &stale {
                tier1.pop(key);
            }
            stale.len()
        };

        let from_tier2 = {
            let mut tier2 = self.tier2.lock();
            let before = tier2.len();
            tier2.retain(|_, entry| entry.is_fresh(now));
            before - tier2.len()
        };

        let removed = from_tier1 + from_tier2;
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        self.tier1.lock().clear();
        self.tier2.lock().clear();
        self.predictions.lock().clear();
    }

    pub fn efficiency_stats(&self) -> CacheEfficiency {
        let tier1_hits = self.tier1_hits.load(Ordering::Relaxed);
        let tier2_hits = self.tier2_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = tier1_hits + tier2_hits + misses;

        let (tier1_size, tier1_capacity) = {
            let tier1 = self.tier1.lock();
            (tier1.len(), tier1.cap().get())
        };
        let tier2_size = self.tier2.lock().len();
        let prediction_patterns = self.predictions.lock().pattern_count();

        self.telemetry.record_sizes(tier1_size, tier2_size);

        CacheEfficiency {
            total_requests: total,
            tier1_hit_rate: percentage(tier1_hits, total),
            tier2_hit_rate: percentage(tier2_hits, total),
            miss_rate: percentage(misses, total),
            tier1_size,
            tier1_capacity,
            tier2_size,
            tier2_capacity: self.tier2_capacity,
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            prediction_patterns,
        }
    }
}

fn evict_oldest_fifth(tier2: &mut HashMap<String, CacheEntry>) -> usize {
    let quota = tier2.len().div_ceil(5);
    let mut by_age: Vec<(Instant, String)> = tier2
        .iter()
        .map(|(key, entry)| (entry.stored_at, key.clone()))
        .collect();
    by_age.sort_unstable();
    for (_, key) in by_age.iter().take(quota) {
        tier2.remove(key);
    }
    quota
}

/// Percentage rounded to one decimal.
fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache(tier1: usize, tier2: usize) -> TieredClassificationCache {
        TieredClassificationCache::new(&CacheConfig {
            tier1_capacity: tier1,
            tier2_capacity: tier2,
            ..CacheConfig::default()
        })
    }

    fn later(age: Duration) -> Instant {
        Instant::now() + age
    }

    #[test]
    fn test_hot_category_is_served_from_tier1() {
        let cache = cache(10, 100);
        cache.set("k", "factual", CacheCategory::Factual);
        assert_eq!(cache.get("k", CacheCategory::Factual).as_deref(), Some("factual"));

        let stats = cache.efficiency_stats();
        assert_eq!(stats.tier1_hit_rate, 100.0);
        assert_eq!(stats.tier1_size, 1);
    }

    #[test]
    fn test_tier2_hit_is_promoted() {
        let cache = cache(10, 100);
        cache.set("k", "philosophical", CacheCategory::Philosophical);
        assert_eq!(cache.tier1.lock().len(), 0);

        assert!(cache.get("k", CacheCategory::Philosophical).is_some());
        assert_eq!(cache.tier1.lock().len(), 1);
        assert!(cache.get("k", CacheCategory::Philosophical).is_some());

        let stats = cache.efficiency_stats();
        assert_eq!(stats.tier2_hit_rate, 50.0);
        assert_eq!(stats.tier1_hit_rate, 50.0);
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let cache = cache(10, 100);
        cache.set("k", "sensitive", CacheCategory::Sensitive);

        let after_ttl = later(Duration::from_secs(31 * 60));
        assert_eq!(cache.get_at("k", CacheCategory::Sensitive, after_ttl), None);
        assert_eq!(cache.tier2.lock().len(), 0);
        let stats = cache.efficiency_stats();
        assert_eq!(stats.miss_rate, 100.0);
        assert_eq!(stats.expired, 1);
    }

    #[test]
    fn test_entry_fresh_for_long_ttl_category() {
        let cache = cache(10, 100);
        cache.set("k", "factual", CacheCategory::Factual);
        let within_ttl = later(Duration::from_secs(23 * 3600));
        assert!(cache.get_at("k", CacheCategory::Factual, within_ttl).is_some());
    }

    #[test]
    fn test_entry_expires_by_its_stored_category() {
        let cache = cache(10, 100);
        cache.set("k", "sensitive", CacheCategory::Sensitive);

        let after_ttl = later(Duration::from_secs(31 * 60));
        assert_eq!(cache.get_at("k", CacheCategory::Factual, after_ttl), None);
        assert_eq!(cache.efficiency_stats().expired, 1);
    }

    #[test]
    fn test_tier2_evicts_oldest_fifth() {
        let cache = cache(2, 10);
        for i in 0..10 {
            cache.set(&format!("k{i}"), "v", CacheCategory::ProblemSolving);
            std::thread::sleep(Duration::from_millis(2));
        }
        cache.set("k10", "v", CacheCategory::ProblemSolving);

        let tier2 = cache.tier2.lock();
        assert_eq!(tier2.len(), 8);
        assert!(!tier2.contains_key("k0"));
        assert!(!tier2.contains_key("k1"));
        assert!(!tier2.contains_key("k2"));
        assert!(tier2.contains_key("k10"));
    }

    #[test]
    fn test_tier1_is_lru_bounded() {
        let cache = cache(2, 100);
        cache.set("a", "v", CacheCategory::Factual);
        cache.set("b", "v", CacheCategory::Factual);
        assert!(cache.get("a", CacheCategory::Factual).is_some());
        cache.set("c", "v", CacheCategory::Factual);

        let tier1 = cache.tier1.lock();
        assert!(tier1.contains("a"));
        assert!(!tier1.contains("b"));
        assert!(tier1.contains("c"));
    }

    #[test]
    fn test_purge_expired_uses_entry_category() {
        let cache = cache(10, 100);
        cache.set("short", "v", CacheCategory::Sensitive);
        cache.set("long", "v", CacheCategory::Factual);

        let hour_later = later(Duration::from_secs(3600));
        assert_eq!(cache.purge_expired_at(hour_later), 1);
        assert!(cache.get_at("long", CacheCategory::Factual, hour_later).is_some());
    }

    #[test]
    fn test_writes_feed_predictions() {
        let cache = cache(10, 100);
        for key in ["a", "b", "c", "a", "b"] {
            cache.set(key, "v", CacheCategory::Factual);
        }
        assert_eq!(cache.predict_next(), vec!["c"]);
    }

    #[test]
    fn test_empty_stats() {
        let stats = cache(10, 100).efficiency_stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.miss_rate, 0.0);
    }
}
