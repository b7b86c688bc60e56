//! # Configuration System
//!
//! Centralized configuration for the conversation core.
//!
//! This crate provides:
//! - Configuration structures for every component
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Configuration validation

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod validation;

pub use config::{
    CacheConfig, ConversationConfig, CoreConfig, HotPathConfig, ObservabilityConfig, RedisConfig,
    ResilienceConfig,
};
pub use file_loader::{load_from_file, load_from_toml, load_from_yaml};
pub use loader::load_from_env;
pub use validation::validate;
