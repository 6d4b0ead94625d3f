//! Loads configuration from an optional TOML file and environment overrides.
//!
//! The environment contract mirrors the deployment convention of shipping the
//! relay pool inline: `VERIPROBE_RELAYS=host:port:source_ip:region,...`.

use std::path::Path;
use std::time::Duration;

use crate::core::error::{AppError, Result};

use super::builder::ConfigBuilder;
use super::file::ConfigFile;
use super::{Config, RelayIdentity};

const DEFAULT_CONFIG_FILE: &str = "veriprobe.toml";

/// Loads the runtime configuration.
///
/// Resolution order: hard defaults, then the TOML file (explicit `path`, or
/// `veriprobe.toml` in the working directory when present), then environment
/// variables, which win over everything.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut builder = ConfigBuilder::new();
    let mut loaded_path = None;

    let candidate = match path {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            default.exists().then(|| default.to_path_buf())
        }
    };

    if let Some(ref file_path) = candidate {
        let raw = std::fs::read_to_string(file_path)?;
        let parsed: ConfigFile = toml::from_str(&raw)
            .map_err(|e| AppError::Config(format!("failed to parse {}: {e}", file_path.display())))?;
        tracing::info!("Loaded configuration from {}", file_path.display());
        loaded_path = Some(file_path.display().to_string());
        builder = builder.apply_file(parsed);
    }

    builder = apply_env_overrides(builder)?;
    builder.loaded_from(loaded_path).build()
}

fn apply_env_overrides(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    if let Ok(raw) = std::env::var("VERIPROBE_RELAYS") {
        let relays = parse_relay_list(&raw)?;
        if !relays.is_empty() {
            builder = builder.relays(relays);
        }
    }
    if let Some(ms) = env_u64("VERIPROBE_SMTP_TIMEOUT_MS")? {
        builder = builder.smtp_timeout(Duration::from_millis(ms));
    }
    if let Some(n) = env_u64("VERIPROBE_MAX_RETRIES")? {
        builder = builder.max_retries(n as u32);
    }
    if let Some(ms) = env_u64("VERIPROBE_RETRY_DELAY_MS")? {
        builder = builder.retry_delay(Duration::from_millis(ms));
    }
    if let Ok(raw) = std::env::var("VERIPROBE_SENDER_DOMAINS") {
        let domains: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !domains.is_empty() {
            builder = builder.sender_domains(domains);
        }
    }
    if let Ok(raw) = std::env::var("VERIPROBE_DNS_SERVERS") {
        let servers: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !servers.is_empty() {
            builder = builder.dns_servers(servers);
        }
    }
    Ok(builder)
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{name} must be an integer, got '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Parses the inline relay list format `host:port:source_ip:region`,
/// comma-separated. Port, source IP, and region are optional suffixes.
pub(crate) fn parse_relay_list(raw: &str) -> Result<Vec<RelayIdentity>> {
    let mut relays = Vec::new();
    for (index, entry) in raw
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .enumerate()
    {
        let mut parts = entry.split(':');
        let host = parts
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AppError::Config(format!("relay entry '{entry}' is missing a host")))?
            .to_string();
        let port = match parts.next() {
            Some(p) if !p.is_empty() => p
                .parse::<u16>()
                .map_err(|_| AppError::Config(format!("relay '{host}' has invalid port '{p}'")))?,
            _ => 25,
        };
        let source_ip = match parts.next() {
            Some(ip) if !ip.is_empty() => Some(ip.parse().map_err(|_| {
                AppError::Config(format!("relay '{host}' has invalid source IP '{ip}'"))
            })?),
            _ => None,
        };
        let region = parts.next().unwrap_or("").trim().to_string();
        relays.push(RelayIdentity {
            host,
            port,
            source_ip,
            region,
            priority: index as u32 + 1,
        });
    }
    Ok(relays)
}
