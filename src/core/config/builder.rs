//! Fluent builder producing a validated runtime [`Config`].

use std::time::Duration;

use crate::core::error::Result;

use super::file::ConfigFile;
use super::validation::validate_config;
use super::{Config, RelayIdentity, ScorePolicy};

/// Builds a [`Config`] starting from the hard defaults, layering in file
/// values and programmatic overrides, then validating the result.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Overlays every value present in the parsed configuration file.
    pub fn apply_file(mut self, file: ConfigFile) -> Self {
        let c = &mut self.config;
        if let Some(ms) = file.smtp.timeout_ms {
            c.smtp_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = file.smtp.max_retries {
            c.max_retries = n;
        }
        if let Some(ms) = file.smtp.retry_delay_ms {
            c.retry_delay = Duration::from_millis(ms);
        }
        if let Some(min) = file.smtp.command_jitter_min_ms {
            c.command_jitter_ms.0 = min;
        }
        if let Some(max) = file.smtp.command_jitter_max_ms {
            c.command_jitter_ms.1 = max;
        }
        if let Some(domains) = file.smtp.sender_domains {
            c.sender_domains = domains;
        }
        if let Some(ms) = file.dns.timeout_ms {
            c.dns_timeout = Duration::from_millis(ms);
        }
        if let Some(servers) = file.dns.servers {
            c.dns_servers = servers;
        }
        if let Some(n) = file.rotation.block_threshold {
            c.block_threshold = n;
        }
        if let Some(s) = file.rotation.rotation_interval_secs {
            c.rotation_interval = Duration::from_secs(s);
        }
        if let Some(s) = file.rotation.usage_reset_interval_secs {
            c.usage_reset_interval = Duration::from_secs(s);
        }
        if let Some(limits) = file.rotation.provider_limits {
            c.provider_limits.extend(limits);
        }
        if let Some(s) = file.health.check_interval_secs {
            c.health_check_interval = Duration::from_secs(s);
        }
        if let Some(n) = file.health.failure_threshold {
            c.health_failure_threshold = n;
        }
        if let Some(n) = file.catchall.probe_count {
            c.catchall_probe_count = n;
        }
        if let Some(ms) = file.catchall.probe_delay_ms {
            c.catchall_probe_delay = Duration::from_millis(ms);
        }
        if let Some(s) = file.rate_limit.window_secs {
            c.api_rate_window = Duration::from_secs(s);
        }
        if let Some(n) = file.rate_limit.max_requests {
            c.api_rate_max_requests = n;
        }
        if let Some(policy) = file.scoring {
            c.score_policy = policy;
        }
        if !file.relays.is_empty() {
            c.relays = file.relays;
        }
        self
    }

    pub fn relays(mut self, relays: Vec<RelayIdentity>) -> Self {
        self.config.relays = relays;
        self
    }

    pub fn sender_domains(mut self, domains: Vec<String>) -> Self {
        self.config.sender_domains = domains;
        self
    }

    pub fn smtp_timeout(mut self, timeout: Duration) -> Self {
        self.config.smtp_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.config.dns_servers = servers;
        self
    }

    pub fn score_policy(mut self, policy: ScorePolicy) -> Self {
        self.config.score_policy = policy;
        self
    }

    pub fn loaded_from(mut self, path: Option<String>) -> Self {
        self.config.loaded_config_path = path;
        self
    }

    /// Validates the assembled configuration and hands it back.
    pub fn build(self) -> Result<Config> {
        validate_config(&self.config)?;
        Ok(self.config)
    }
}
