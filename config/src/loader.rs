//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles. Unset variables fall back to defaults; set but malformed
//! variables are reported instead of being silently ignored.
//!
//! # Naming Convention
//! - `RD_*`: Redis settings (`REDIS_URL` is honoured as well)
//! - `CV_*`: Conversation memory settings
//! - `CC_*`: Classification cache settings
//! - `HP_*`: Hot path settings
//! - `RS_*`: Resilience settings
//! - `OB_*`: Observability settings

use crate::config::{
    CacheConfig, ConversationConfig, CoreConfig, HotPathConfig, ObservabilityConfig, RedisConfig,
    ResilienceConfig,
};
use errors::ConfigError;
use std::env;

/// Load configuration from environment variables.
///
/// ## Environment Variables
/// ### Redis (`RD_*`)
/// - `RD_ENABLED`, `RD_URL` (or `REDIS_URL`), `RD_HOST`, `RD_PORT`, `RD_DB`,
///   `RD_CONNECT_TIMEOUT_MS`
///
/// ### Conversation (`CV_*`)
/// - `CV_WINDOW_SIZE`, `CV_EXPIRATION_SECS`, `CV_LOCK_TIMEOUT_MS`,
///   `CV_LOCK_REGISTRY_CAPACITY`, `CV_MAX_FALLBACK_USERS`,
///   `CV_FALLBACK_IDLE_SECS`, `CV_STATS_RECENT_ENTRIES`
///
/// ### Cache (`CC_*`)
/// - `CC_TIER1_CAPACITY`, `CC_TIER2_CAPACITY`, `CC_PREDICTION_WINDOW`,
///   `CC_MAX_PATTERNS`, `CC_MAX_PREDICTIONS_PER_PATTERN`
///
/// ### Hot path (`HP_*`)
/// - `HP_ENABLED`, `HP_MAX_WORDS`, `HP_FREQUENCY_CAPACITY`
///
/// ### Resilience (`RS_*`)
/// - `RS_MAX_ATTEMPTS`, `RS_BASE_DELAY_MS`, `RS_MAX_DELAY_MS`,
///   `RS_JITTER_RATIO`, `RS_CIRCUIT_FAILURE_THRESHOLD`, `RS_CIRCUIT_RESET_SECS`
///
/// ### Observability (`OB_*`)
/// - `OB_LOGGING_LEVEL`
pub fn load_from_env() -> Result<CoreConfig, ConfigError> {
    Ok(CoreConfig {
        redis: load_redis_from_env()?,
        conversation: load_conversation_from_env()?,
        cache: load_cache_from_env()?,
        hot_path: load_hot_path_from_env()?,
        resilience: load_resilience_from_env()?,
        observability: load_observability_from_env()?,
    })
}

fn load_redis_from_env() -> Result<RedisConfig, ConfigError> {
    let defaults = RedisConfig::default();
    Ok(RedisConfig {
        enabled: env_or("RD_ENABLED", defaults.enabled)?,
        url: env::var("RD_URL").or_else(|_| env::var("REDIS_URL")).ok(),
        host: env::var("RD_HOST").unwrap_or(defaults.host),
        port: env_or("RD_PORT", defaults.port)?,
        db: env_or("RD_DB", defaults.db)?,
        connect_timeout_ms: env_or("RD_CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms)?,
    })
}

fn load_conversation_from_env() -> Result<ConversationConfig, ConfigError> {
    let defaults = ConversationConfig::default();
    Ok(ConversationConfig {
        window_size: env_or("CV_WINDOW_SIZE", defaults.window_size)?,
        expiration_secs: env_or("CV_EXPIRATION_SECS", defaults.expiration_secs)?,
        lock_timeout_ms: env_or("CV_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms)?,
        lock_registry_capacity: env_or(
            "CV_LOCK_REGISTRY_CAPACITY",
            defaults.lock_registry_capacity,
        )?,
        max_fallback_users: env_or("CV_MAX_FALLBACK_USERS", defaults.max_fallback_users)?,
        fallback_idle_secs: env_or("CV_FALLBACK_IDLE_SECS", defaults.fallback_idle_secs)?,
        stats_recent_entries: env_or("CV_STATS_RECENT_ENTRIES", defaults.stats_recent_entries)?,
    })
}

fn load_cache_from_env() -> Result<CacheConfig, ConfigError> {
    let defaults = CacheConfig::default();
    Ok(CacheConfig {
        tier1_capacity: env_or("CC_TIER1_CAPACITY", defaults.tier1_capacity)?,
        tier2_capacity: env_or("CC_TIER2_CAPACITY", defaults.tier2_capacity)?,
        prediction_window: env_or("CC_PREDICTION_WINDOW", defaults.prediction_window)?,
        max_patterns: env_or("CC_MAX_PATTERNS", defaults.max_patterns)?,
        max_predictions_per_pattern: env_or(
            "CC_MAX_PREDICTIONS_PER_PATTERN",
            defaults.max_predictions_per_pattern,
        )?,
    })
}

fn load_hot_path_from_env() -> Result<HotPathConfig, ConfigError> {
    let defaults = HotPathConfig::default();
    Ok(HotPathConfig {
        enabled: env_or("HP_ENABLED", defaults.enabled)?,
        max_words: env_or("HP_MAX_WORDS", defaults.max_words)?,
        frequency_capacity: env_or("HP_FREQUENCY_CAPACITY", defaults.frequency_capacity)?,
    })
}

fn load_resilience_from_env() -> Result<ResilienceConfig, ConfigError> {
    let defaults = ResilienceConfig::default();
    Ok(ResilienceConfig {
        max_attempts: env_or("RS_MAX_ATTEMPTS", defaults.max_attempts)?,
        base_delay_ms: env_or("RS_BASE_DELAY_MS", defaults.base_delay_ms)?,
        max_delay_ms: env_or("RS_MAX_DELAY_MS", defaults.max_delay_ms)?,
        jitter_ratio: env_or("RS_JITTER_RATIO", defaults.jitter_ratio)?,
        circuit_failure_threshold: env_or(
            "RS_CIRCUIT_FAILURE_THRESHOLD",
            defaults.circuit_failure_threshold,
        )?,
        circuit_reset_secs: env_or("RS_CIRCUIT_RESET_SECS", defaults.circuit_reset_secs)?,
    })
}

fn load_observability_from_env() -> Result<ObservabilityConfig, ConfigError> {
    let defaults = ObservabilityConfig::default();
    Ok(ObservabilityConfig {
        logging_level: env::var("OB_LOGGING_LEVEL").unwrap_or(defaults.logging_level),
    })
}

fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidEnv {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const TOUCHED: &[&str] = &[
        "RD_ENABLED",
        "RD_URL",
        "REDIS_URL",
        "RD_HOST",
        "CV_WINDOW_SIZE",
        "CV_LOCK_TIMEOUT_MS",
        "CC_TIER1_CAPACITY",
        "RS_MAX_ATTEMPTS",
        "OB_LOGGING_LEVEL",
    ];

    fn clear_env() {
        for key in TOUCHED {
            unsafe {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_load_from_env_defaults() {
        clear_env();
        let config = load_from_env().unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_from_env_overrides() {
        clear_env();
        unsafe {
            env::set_var("RD_HOST", "cache.internal");
            env::set_var("CV_WINDOW_SIZE", "10");
            env::set_var("CV_LOCK_TIMEOUT_MS", "500");
            env::set_var("CC_TIER1_CAPACITY", "32");
            env::set_var("RS_MAX_ATTEMPTS", "5");
            env::set_var("OB_LOGGING_LEVEL", "debug");
        }

        let config = load_from_env().unwrap();
        assert_eq!(config.redis.host, "cache.internal");
        assert_eq!(config.conversation.window_size, 10);
        assert_eq!(config.conversation.lock_timeout_ms, 500);
        assert_eq!(config.cache.tier1_capacity, 32);
        assert_eq!(config.resilience.max_attempts, 5);
        assert_eq!(config.observability.logging_level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_redis_url_fallback_variable() {
        clear_env();
        unsafe {
            env::set_var("REDIS_URL", "redis://remote:6379/1");
        }
        let config = load_from_env().unwrap();
        assert_eq!(config.redis.connection_url(), "redis://remote:6379/1");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_malformed_value_is_reported() {
        clear_env();
        unsafe {
            env::set_var("CV_WINDOW_SIZE", "fifteen");
        }
        let err = load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "CV_WINDOW_SIZE"));
        clear_env();
    }
}
