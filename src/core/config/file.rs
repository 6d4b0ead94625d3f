//! Defines the structure mirroring the TOML configuration file format.

use serde::Deserialize;
use std::collections::HashMap;

use super::{ProviderLimits, RelayIdentity, ScorePolicy};

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub(crate) smtp: SmtpSection,
    #[serde(default)]
    pub(crate) dns: DnsSection,
    #[serde(default)]
    pub(crate) rotation: RotationSection,
    #[serde(default)]
    pub(crate) health: HealthSection,
    #[serde(default)]
    pub(crate) catchall: CatchAllSection,
    #[serde(default)]
    pub(crate) rate_limit: RateLimitSection,
    #[serde(default)]
    pub(crate) scoring: Option<ScorePolicy>,
    #[serde(default)]
    pub(crate) relays: Vec<RelayIdentity>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct SmtpSection {
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) retry_delay_ms: Option<u64>,
    pub(crate) command_jitter_min_ms: Option<u64>,
    pub(crate) command_jitter_max_ms: Option<u64>,
    pub(crate) sender_domains: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct DnsSection {
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) servers: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct RotationSection {
    pub(crate) block_threshold: Option<u32>,
    pub(crate) rotation_interval_secs: Option<u64>,
    pub(crate) usage_reset_interval_secs: Option<u64>,
    pub(crate) provider_limits: Option<HashMap<String, ProviderLimits>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct HealthSection {
    pub(crate) check_interval_secs: Option<u64>,
    pub(crate) failure_threshold: Option<u32>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct CatchAllSection {
    pub(crate) probe_count: Option<usize>,
    pub(crate) probe_delay_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct RateLimitSection {
    pub(crate) window_secs: Option<u64>,
    pub(crate) max_requests: Option<u32>,
}
