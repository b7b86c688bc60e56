use dialogue_core::CacheCategory;
use metrics::{counter, gauge};

#[derive(Debug, Default)]
pub struct CacheTelemetry {
    _private: (),
}

impl CacheTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, tier: &'static str, category: CacheCategory) {
        counter!("classification_cache_hits_total",
            "tier" => tier,
            "category" => category.to_string()
        )
        .increment(1);
    }

    pub fn record_miss(&self, category: CacheCategory) {
        counter!("classification_cache_misses_total", "category" => category.to_string())
            .increment(1);
    }

    pub fn record_evictions(&self, count: usize) {
        counter!("classification_cache_evictions_total").increment(count as u64);
    }

    pub fn record_sizes(&self, tier1: usize, tier2: usize) {
        gauge!("classification_cache_size", "tier" => "tier1").set(tier1 as f64);
        gauge!("classification_cache_size", "tier" => "tier2").set(tier2 as f64);
    }

    pub fn record_hot_path_match(&self, pattern: &'static str) {
        counter!("hot_path_matches_total", "pattern" => pattern).increment(1);
    }

    pub fn record_classification(&self, source: &'static str, category: CacheCategory) {
        counter!("classifications_total",
            "source" => source,
            "category" => category.to_string()
        )
        .increment(1);
    }
}
