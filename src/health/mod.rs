//! Relay liveness monitoring, decoupled from probe traffic.
//!
//! Each sweep resolves the relay host and attempts a bare TCP connect bound
//! to its source IP; no SMTP commands are exchanged. The monitor is the sole
//! writer of the health table, and rotation consults it read-only when
//! choosing an identity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::core::config::{Config, RelayIdentity};
use crate::smtp::session::ProbeSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Last observed liveness of one relay.
#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub last_check_at: Option<DateTime<Utc>>,
    pub response_time_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            last_check_at: None,
            response_time_ms: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

/// Aggregate result of one sweep over the whole pool.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub checked_at: DateTime<Utc>,
    pub total: usize,
    pub healthy: usize,
    pub per_relay: Vec<RelayHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayHealth {
    pub host: String,
    pub key: String,
    pub healthy: bool,
    pub record: HealthRecord,
}

pub struct HealthMonitor {
    config: Arc<Config>,
    relays: Vec<RelayIdentity>,
    records: HashMap<String, Mutex<HealthRecord>>,
}

impl HealthMonitor {
    pub fn new(config: Arc<Config>) -> Self {
        let relays = config.relays.clone();
        let records = relays
            .iter()
            .map(|relay| (relay.key(), Mutex::new(HealthRecord::default())))
            .collect();
        Self {
            config,
            relays,
            records,
        }
    }

    /// Checks one relay: hostname resolution plus a bare TCP connect bound to
    /// the relay's source IP, under the configured timeout.
    pub async fn check_relay(&self, relay: &RelayIdentity) -> bool {
        let key = relay.key();
        let started = Instant::now();
        let result = ProbeSession::connect(
            &relay.host,
            relay.port,
            relay.source_ip,
            self.config.smtp_timeout,
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let Some(entry) = self.records.get(&key) else {
            return false;
        };
        match result {
            Ok(session) => {
                session.abort().await;
                let mut record = entry.lock();
                record.status = HealthStatus::Healthy;
                record.last_check_at = Some(Utc::now());
                record.response_time_ms = Some(elapsed_ms);
                record.consecutive_failures = 0;
                record.last_error = None;
                tracing::debug!(relay = %relay.host, key = %key, elapsed_ms, "health check passed");
                true
            }
            Err(err) => {
                let mut record = entry.lock();
                record.status = HealthStatus::Unhealthy;
                record.last_check_at = Some(Utc::now());
                record.response_time_ms = Some(elapsed_ms);
                record.consecutive_failures += 1;
                record.last_error = Some(err.to_string());
                tracing::warn!(
                    relay = %relay.host,
                    key = %key,
                    consecutive_failures = record.consecutive_failures,
                    error = %err,
                    "health check failed"
                );
                false
            }
        }
    }

    /// Sweeps every configured relay concurrently.
    pub async fn check_all(&self) -> HealthSummary {
        let checks = self.relays.iter().map(|relay| async {
            let healthy = self.check_relay(relay).await;
            RelayHealth {
                host: relay.host.clone(),
                key: relay.key(),
                healthy,
                record: self.record(&relay.key()),
            }
        });
        let per_relay: Vec<RelayHealth> = futures::future::join_all(checks).await;
        let healthy = per_relay.iter().filter(|r| r.healthy).count();
        HealthSummary {
            checked_at: Utc::now(),
            total: per_relay.len(),
            healthy,
            per_relay,
        }
    }

    /// Snapshot of one relay's record; `Unknown` default for foreign keys.
    pub fn record(&self, key: &str) -> HealthRecord {
        self.records
            .get(key)
            .map(|entry| entry.lock().clone())
            .unwrap_or_default()
    }

    /// The dampening contract: healthy status and a failure streak below the
    /// configured threshold.
    pub fn is_healthy(&self, relay: &RelayIdentity) -> bool {
        let record = self.record(&relay.key());
        record.status == HealthStatus::Healthy
            && record.consecutive_failures < self.config.health_failure_threshold
    }

    /// Rotation eligibility: a relay that has never been swept is given the
    /// benefit of the doubt; one that failed its last check is not.
    pub fn is_usable(&self, relay: &RelayIdentity) -> bool {
        let record = self.record(&relay.key());
        match record.status {
            HealthStatus::Unknown => true,
            HealthStatus::Healthy => {
                record.consecutive_failures < self.config.health_failure_threshold
            }
            HealthStatus::Unhealthy => false,
        }
    }

    /// Spawns the periodic sweep (default every 5 minutes). The returned
    /// guard aborts the task on drop.
    pub fn spawn_background_task(self: &Arc<Self>) -> HealthTasks {
        let monitor = Arc::clone(self);
        let interval = self.config.health_check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let summary = monitor.check_all().await;
                tracing::info!(
                    healthy = summary.healthy,
                    total = summary.total,
                    "periodic health sweep finished"
                );
            }
        });
        HealthTasks { handle }
    }
}

/// Owns the periodic sweep task; dropping it cancels the timer.
pub struct HealthTasks {
    handle: JoinHandle<()>,
}

impl Drop for HealthTasks {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_relays_are_usable_but_not_healthy() {
        let mut config = Config::default();
        config.relays = vec![RelayIdentity {
            host: "relay.test".into(),
            port: 25,
            source_ip: None,
            region: String::new(),
            priority: 1,
        }];
        let config = Arc::new(config);
        let monitor = HealthMonitor::new(Arc::clone(&config));
        let relay = &config.relays[0];
        assert!(monitor.is_usable(relay));
        assert!(!monitor.is_healthy(relay));
        assert_eq!(monitor.record("relay.test").status, HealthStatus::Unknown);
    }
}
