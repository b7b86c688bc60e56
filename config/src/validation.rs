//! # Configuration Validation
//!
//! Validation for all configuration structures using the `validator` crate,
//! plus the cross-field rules that derive attributes cannot express.

use crate::config::CoreConfig;
use errors::ConfigError;
use validator::Validate;

/// Validate a complete configuration.
///
/// ## Validation Rules
/// - Field ranges declared on each section
/// - `resilience.base_delay_ms` must not exceed `resilience.max_delay_ms`
/// - `cache.tier1_capacity` must not exceed `cache.tier2_capacity`
pub fn validate(config: &CoreConfig) -> Result<(), ConfigError> {
    config.validate().map_err(|e| ConfigError::Validation {
        reason: e.to_string(),
    })?;

    if config.resilience.base_delay_ms > config.resilience.max_delay_ms {
        return Err(ConfigError::Validation {
            reason: format!(
                "resilience.base_delay_ms ({}) exceeds resilience.max_delay_ms ({})",
                config.resilience.base_delay_ms, config.resilience.max_delay_ms
            ),
        });
    }

    if config.cache.tier1_capacity > config.cache.tier2_capacity {
        return Err(ConfigError::Validation {
            reason: format!(
                "cache.tier1_capacity ({}) exceeds cache.tier2_capacity ({})",
                config.cache.tier1_capacity, config.cache.tier2_capacity
            ),
        });
    }

    Ok(())
}
