//! Defines the core runtime `Config` struct, its defaults, and related utilities.
//! Submodules handle loading, building, and validation.

pub(crate) mod builder;
pub(crate) mod file;
pub(crate) mod loading;
pub(crate) mod validation;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;
pub use loading::load_config;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

/// A sending identity usable for an outbound probe. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayIdentity {
    /// Hostname the probe socket connects out through (or to, for local relays).
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Source address the outbound socket binds to, when pinned.
    pub source_ip: Option<IpAddr>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub priority: u32,
}

fn default_smtp_port() -> u16 {
    25
}

impl RelayIdentity {
    /// Stable key for usage/health bookkeeping: the pinned source IP when
    /// present, otherwise the host name.
    pub fn key(&self) -> String {
        match self.source_ip {
            Some(ip) => ip.to_string(),
            None => self.host.clone(),
        }
    }
}

/// Per-provider request ceilings and pacing, keyed by provider name with a
/// `"default"` fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLimits {
    pub max_per_ip: u32,
    pub delay_ms: u64,
    pub rotate_every: u32,
}

/// The additive weights and penalty caps used by the orchestrator. These are
/// policy, not constants: callers may override any of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePolicy {
    pub syntax_points: u8,
    pub dns_points: u8,
    pub reputation_points: u8,
    pub smtp_points: u8,
    pub disposable_cap: u8,
    pub role_cap: u8,
    pub typo_penalty: u8,
    pub valid_threshold: u8,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self {
            syntax_points: 25,
            dns_points: 25,
            reputation_points: 25,
            smtp_points: 25,
            disposable_cap: 40,
            role_cap: 60,
            typo_penalty: 10,
            valid_threshold: 70,
        }
    }
}

/// Runtime configuration settings used by the veriprobe core logic.
#[derive(Clone)]
pub struct Config {
    pub smtp_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Randomized pause between SMTP commands, in milliseconds (min, max).
    pub command_jitter_ms: (u64, u64),

    pub relays: Vec<RelayIdentity>,
    /// Pool of HELO/MAIL FROM domains rotated across probes.
    pub sender_domains: Vec<String>,

    pub dns_timeout: Duration,
    pub dns_servers: Vec<String>,

    pub provider_limits: HashMap<String, ProviderLimits>,
    /// Consecutive probe failures before a source IP enters the block set.
    pub block_threshold: u32,
    pub rotation_interval: Duration,
    pub usage_reset_interval: Duration,

    pub health_check_interval: Duration,
    /// Consecutive health-check failures before a relay is considered unusable.
    pub health_failure_threshold: u32,

    pub catchall_probe_count: usize,
    pub catchall_probe_delay: Duration,

    pub api_rate_window: Duration,
    pub api_rate_max_requests: u32,

    pub score_policy: ScorePolicy,

    pub loaded_config_path: Option<String>,
}

impl Config {
    fn build_default() -> Self {
        let sender_domains = ["outlook.com", "yahoo.com", "aol.com", "hotmail.com"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let dns_servers = vec![
            "8.8.8.8".to_string(),
            "8.8.4.4".to_string(),
            "1.1.1.1".to_string(),
            "1.0.0.1".to_string(),
        ];
        let mut provider_limits = HashMap::new();
        provider_limits.insert(
            "gmail".to_string(),
            ProviderLimits {
                max_per_ip: 400,
                delay_ms: 4000,
                rotate_every: 100,
            },
        );
        provider_limits.insert(
            "yahoo".to_string(),
            ProviderLimits {
                max_per_ip: 500,
                delay_ms: 3000,
                rotate_every: 120,
            },
        );
        provider_limits.insert(
            "outlook".to_string(),
            ProviderLimits {
                max_per_ip: 450,
                delay_ms: 3500,
                rotate_every: 110,
            },
        );
        provider_limits.insert(
            "default".to_string(),
            ProviderLimits {
                max_per_ip: 600,
                delay_ms: 2000,
                rotate_every: 150,
            },
        );

        Config {
            smtp_timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            command_jitter_ms: (200, 600),
            relays: Vec::new(),
            sender_domains,
            dns_timeout: Duration::from_secs(5),
            dns_servers,
            provider_limits,
            block_threshold: 5,
            rotation_interval: Duration::from_secs(3600),
            usage_reset_interval: Duration::from_secs(24 * 60 * 60),
            health_check_interval: Duration::from_secs(300),
            health_failure_threshold: 3,
            catchall_probe_count: 3,
            catchall_probe_delay: Duration::from_secs(1),
            api_rate_window: Duration::from_secs(15 * 60),
            api_rate_max_requests: 100,
            score_policy: ScorePolicy::default(),
            loaded_config_path: None,
        }
    }

    /// Cooldown applied to a blocked source IP before it is eligible again.
    pub fn block_cooldown(&self) -> Duration {
        self.retry_delay * 10
    }

    /// Ceiling for the given provider name, falling back to `"default"`.
    pub fn provider_limit(&self, provider: &str) -> ProviderLimits {
        self.provider_limits
            .get(provider)
            .or_else(|| self.provider_limits.get("default"))
            .cloned()
            .unwrap_or(ProviderLimits {
                max_per_ip: 600,
                delay_ms: 2000,
                rotate_every: 150,
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::build_default()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("smtp_timeout", &self.smtp_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("command_jitter_ms", &self.command_jitter_ms)
            .field("relay_count", &self.relays.len())
            .field("sender_domain_count", &self.sender_domains.len())
            .field("dns_timeout", &self.dns_timeout)
            .field("dns_servers_count", &self.dns_servers.len())
            .field("block_threshold", &self.block_threshold)
            .field("rotation_interval", &self.rotation_interval)
            .field("usage_reset_interval", &self.usage_reset_interval)
            .field("health_check_interval", &self.health_check_interval)
            .field(
                "health_failure_threshold",
                &self.health_failure_threshold,
            )
            .field("catchall_probe_count", &self.catchall_probe_count)
            .field("catchall_probe_delay", &self.catchall_probe_delay)
            .field("api_rate_window", &self.api_rate_window)
            .field("api_rate_max_requests", &self.api_rate_max_requests)
            .field("score_policy", &self.score_policy)
            .field("loaded_config_path", &self.loaded_config_path)
            .finish()
    }
}

/// Utility function to get a randomized inter-command pause based on [`Config`].
///
/// Uses the `command_jitter_ms` setting from the provided configuration.
pub fn get_command_jitter(config: &Config) -> Duration {
    use rand::Rng;
    let (min, max) = config.command_jitter_ms;
    if min >= max {
        return Duration::from_millis(min);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min..max))
}
