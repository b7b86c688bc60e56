//! # Classifier
//!
//! Classifies free-text user input into question categories or lead states.
//!
//! - [`hot_path`]: regex shortcut for short, frequent messages
//! - [`tiered_cache`]: two-tier TTL cache with next-key prediction
//! - [`keywords`]: keyword tables and humor taboo detection
//! - [`pipeline`]: the [`Classifier`] tying the stages to the model

pub mod hot_path;
pub mod keywords;
pub mod pipeline;
pub mod policy;
pub mod prediction;
pub mod telemetry;
pub mod tiered_cache;

pub use hot_path::{HotPathClassifier, HotPathMatch};
pub use keywords::KeywordClassifier;
pub use pipeline::{Classification, ClassificationSource, Classifier};
pub use policy::{
    CategoryPolicy, cache_key, normalize_input, policy, retention_category, validate_label,
};
pub use prediction::PredictionIndex;
pub use telemetry::CacheTelemetry;
pub use tiered_cache::{CacheEfficiency, TieredClassificationCache};
