//! Sanity checks applied to an assembled [`Config`] before it is handed out.

use crate::core::error::{AppError, Result};

use super::Config;

pub(crate) fn validate_config(config: &Config) -> Result<()> {
    if config.smtp_timeout.is_zero() {
        return Err(AppError::Config("smtp timeout must be non-zero".into()));
    }
    if config.dns_timeout.is_zero() {
        return Err(AppError::Config("dns timeout must be non-zero".into()));
    }
    if config.sender_domains.is_empty() {
        return Err(AppError::Config(
            "at least one sender domain is required for HELO rotation".into(),
        ));
    }
    if config.block_threshold == 0 {
        return Err(AppError::Config("block threshold must be at least 1".into()));
    }
    if config.health_failure_threshold == 0 {
        return Err(AppError::Config(
            "health failure threshold must be at least 1".into(),
        ));
    }
    if config.catchall_probe_count == 0 {
        return Err(AppError::Config(
            "catch-all detection needs at least one probe address".into(),
        ));
    }
    let (jitter_min, jitter_max) = config.command_jitter_ms;
    if jitter_min > jitter_max {
        return Err(AppError::Config(format!(
            "command jitter minimum ({jitter_min}ms) exceeds maximum ({jitter_max}ms)"
        )));
    }
    for relay in &config.relays {
        if relay.host.is_empty() {
            return Err(AppError::Config("relay with empty host".into()));
        }
        if relay.port == 0 {
            return Err(AppError::Config(format!(
                "relay '{}' has port 0",
                relay.host
            )));
        }
    }
    let policy = &config.score_policy;
    let total = policy.syntax_points as u32
        + policy.dns_points as u32
        + policy.reputation_points as u32
        + policy.smtp_points as u32;
    if total > 100 {
        return Err(AppError::Config(format!(
            "score weights sum to {total}, which exceeds 100"
        )));
    }
    if policy.valid_threshold > 100 {
        return Err(AppError::Config(
            "valid threshold cannot exceed 100".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_zero_smtp_timeout() {
        let mut config = Config::default();
        config.smtp_timeout = Duration::ZERO;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_empty_sender_pool() {
        let mut config = Config::default();
        config.sender_domains.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_overweight_scoring() {
        let mut config = Config::default();
        config.score_policy.smtp_points = 90;
        assert!(validate_config(&config).is_err());
    }
}
