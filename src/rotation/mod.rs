//! Relay identity rotation and per-identity rate limiting.
//!
//! Owns the process-wide pool of outbound sending identities, tracks usage
//! and success rate per source IP, and blocks identities that keep failing.
//! Selection never returns a blocked or over-ceiling identity; when nothing
//! is eligible the caller gets [`AppError::NoAvailableRelay`], which must
//! surface as "unknown", never as "does not exist".

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::core::config::{Config, RelayIdentity};
use crate::core::error::{AppError, Result};

/// Per-identity usage counters, keyed by the identity's source IP (or host).
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub request_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Exponentially weighted moving average, weight 0.1 per event.
    pub success_rate: f64,
    pub consecutive_failures: u32,
}

impl Default for UsageStats {
    fn default() -> Self {
        Self {
            request_count: 0,
            last_used_at: None,
            success_rate: 1.0,
            consecutive_failures: 0,
        }
    }
}

/// Read-only snapshot of the rotator for introspection endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RotatorStats {
    pub total_identities: usize,
    pub available_identities: usize,
    pub blocked_ips: Vec<String>,
    pub usage: HashMap<String, UsageStats>,
}

struct BlockEntry {
    until: Instant,
}

/// The rotation component. One instance per process, shared behind an `Arc`.
pub struct RelayRotator {
    config: Arc<Config>,
    identities: Vec<RelayIdentity>,
    /// One lock per identity; the key set is fixed at load time.
    stats: HashMap<String, Mutex<UsageStats>>,
    blocked: Mutex<HashMap<String, BlockEntry>>,
    /// Advanced by a background timer; breaks ranking ties so equal-score
    /// identities take turns.
    pointer: AtomicUsize,
}

impl RelayRotator {
    pub fn new(config: Arc<Config>) -> Self {
        let identities = config.relays.clone();
        let stats = identities
            .iter()
            .map(|identity| (identity.key(), Mutex::new(UsageStats::default())))
            .collect();
        Self {
            config,
            identities,
            stats,
            blocked: Mutex::new(HashMap::new()),
            pointer: AtomicUsize::new(0),
        }
    }

    /// Selects the best eligible identity: not blocked, under its provider
    /// ceiling, and passing the caller-supplied availability check (normally
    /// the health monitor's verdict).
    pub fn select_identity_with<F>(&self, available: F) -> Result<RelayIdentity>
    where
        F: Fn(&RelayIdentity) -> bool,
    {
        self.expire_blocks();
        let pointer = self.pointer.load(Ordering::Relaxed);
        let mut best: Option<(f64, usize, &RelayIdentity)> = None;

        for (index, identity) in self.identities.iter().enumerate() {
            let key = identity.key();
            if self.is_blocked(&key) || !self.is_within_limit(identity) || !available(identity) {
                continue;
            }
            let score = {
                let stats = self.stats[&key].lock();
                -(stats.request_count as f64) * stats.success_rate
            };
            // Distance from the rotation pointer orders equal scores.
            let distance = (index + self.identities.len() - pointer % self.identities.len().max(1))
                % self.identities.len().max(1);
            let better = match best {
                None => true,
                Some((best_score, best_distance, _)) => {
                    score > best_score || (score == best_score && distance < best_distance)
                }
            };
            if better {
                best = Some((score, distance, identity));
            }
        }

        best.map(|(_, _, identity)| identity.clone()).ok_or_else(|| {
            AppError::NoAvailableRelay(format!(
                "{} identities configured, none eligible",
                self.identities.len()
            ))
        })
    }

    /// Selection without an external availability signal.
    pub fn select_identity(&self) -> Result<RelayIdentity> {
        self.select_identity_with(|_| true)
    }

    /// True while the identity's request count is under its provider ceiling.
    pub fn is_within_limit(&self, identity: &RelayIdentity) -> bool {
        let limit = self.config.provider_limit(self.provider_for(identity));
        match self.stats.get(&identity.key()) {
            Some(stats) => stats.lock().request_count < u64::from(limit.max_per_ip),
            None => false,
        }
    }

    /// Records a completed probe. Nudges the success rate toward 1 and clears
    /// the failure streak.
    pub fn record_success(&self, identity: &RelayIdentity) {
        let key = identity.key();
        let Some(entry) = self.stats.get(&key) else {
            return;
        };
        let mut stats = entry.lock();
        stats.request_count += 1;
        stats.last_used_at = Some(Utc::now());
        stats.consecutive_failures = 0;
        stats.success_rate = (stats.success_rate * 0.9 + 0.1).clamp(0.0, 1.0);
        tracing::debug!(
            identity = %key,
            success_rate = stats.success_rate,
            "probe success recorded"
        );
    }

    /// Records a failed probe. Decays the success rate and blocks the
    /// identity once the failure streak reaches the configured threshold.
    pub fn record_failure(&self, identity: &RelayIdentity, error: &str) {
        let key = identity.key();
        let Some(entry) = self.stats.get(&key) else {
            return;
        };
        let failures = {
            let mut stats = entry.lock();
            stats.request_count += 1;
            stats.last_used_at = Some(Utc::now());
            stats.consecutive_failures += 1;
            stats.success_rate = (stats.success_rate * 0.9).clamp(0.0, 1.0);
            tracing::warn!(
                identity = %key,
                success_rate = stats.success_rate,
                consecutive_failures = stats.consecutive_failures,
                error,
                "probe failure recorded"
            );
            stats.consecutive_failures
        };
        if failures >= self.config.block_threshold {
            self.block(&key);
        }
    }

    fn block(&self, key: &str) {
        let until = Instant::now() + self.config.block_cooldown();
        self.blocked
            .lock()
            .insert(key.to_string(), BlockEntry { until });
        tracing::warn!(identity = %key, cooldown = ?self.config.block_cooldown(), "identity blocked after consecutive failures");
    }

    fn is_blocked(&self, key: &str) -> bool {
        self.blocked.lock().contains_key(key)
    }

    /// Lazily expires block entries whose cooldown has elapsed, resetting the
    /// failure streak of each freed identity.
    fn expire_blocks(&self) {
        let now = Instant::now();
        let mut blocked = self.blocked.lock();
        let expired: Vec<String> = blocked
            .iter()
            .filter(|(_, entry)| entry.until <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            blocked.remove(&key);
            if let Some(entry) = self.stats.get(&key) {
                entry.lock().consecutive_failures = 0;
            }
            tracing::info!(identity = %key, "identity unblocked after cooldown");
        }
    }

    /// Rolling-window reset: wipes usage counters and the block set. Runs
    /// daily by default, decoupled from the per-block cooldown.
    pub fn reset_usage(&self) {
        for entry in self.stats.values() {
            *entry.lock() = UsageStats::default();
        }
        self.blocked.lock().clear();
        tracing::info!("daily relay usage stats reset");
    }

    fn advance_pointer(&self) {
        if !self.identities.is_empty() {
            self.pointer.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn provider_for<'a>(&self, identity: &'a RelayIdentity) -> &'a str {
        // Ceilings are keyed by region when the region names a configured
        // provider; otherwise the default ceiling applies.
        if self.config.provider_limits.contains_key(&identity.region) {
            identity.region.as_str()
        } else {
            "default"
        }
    }

    /// Snapshot for the introspection surface.
    pub fn stats(&self) -> RotatorStats {
        self.expire_blocks();
        let blocked: Vec<String> = self.blocked.lock().keys().cloned().collect();
        let available_identities = self
            .identities
            .iter()
            .filter(|identity| {
                !blocked.contains(&identity.key()) && self.is_within_limit(identity)
            })
            .count();
        let usage = self
            .stats
            .iter()
            .map(|(key, entry)| (key.clone(), entry.lock().clone()))
            .collect();
        RotatorStats {
            total_identities: self.identities.len(),
            available_identities,
            blocked_ips: blocked,
            usage,
        }
    }

    /// Spawns the rotation-pointer and daily-reset timers. The returned guard
    /// aborts both tasks when dropped; no timer outlives its owner.
    pub fn spawn_background_tasks(self: &Arc<Self>) -> RotatorTasks {
        let reset_owner = Arc::clone(self);
        let reset_interval = self.config.usage_reset_interval;
        let reset = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reset_interval);
            ticker.tick().await; // immediate first tick is not a reset
            loop {
                ticker.tick().await;
                reset_owner.reset_usage();
            }
        });

        let rotate_owner = Arc::clone(self);
        let rotate_interval = self.config.rotation_interval;
        let rotate = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(rotate_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                rotate_owner.advance_pointer();
            }
        });

        RotatorTasks {
            handles: vec![reset, rotate],
        }
    }
}

/// Owns the rotator's recurring tasks; dropping it cancels them.
pub struct RotatorTasks {
    handles: Vec<JoinHandle<()>>,
}

impl Drop for RotatorTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use std::time::Duration;

    fn relay(host: &str, ip: &str) -> RelayIdentity {
        RelayIdentity {
            host: host.to_string(),
            port: 25,
            source_ip: Some(ip.parse::<IpAddr>().unwrap()),
            region: String::new(),
            priority: 1,
        }
    }

    fn rotator_with(relays: Vec<RelayIdentity>, tweak: impl FnOnce(&mut Config)) -> RelayRotator {
        let mut config = Config::default();
        config.relays = relays;
        tweak(&mut config);
        RelayRotator::new(Arc::new(config))
    }

    #[test]
    fn success_rate_stays_in_bounds() {
        let identity = relay("smtp1.test", "10.0.0.1");
        let rotator = rotator_with(vec![identity.clone()], |_| {});
        for _ in 0..50 {
            rotator.record_failure(&identity, "refused");
        }
        let stats = rotator.stats();
        let usage = &stats.usage["10.0.0.1"];
        assert!(usage.success_rate >= 0.0 && usage.success_rate <= 1.0);
        for _ in 0..100 {
            rotator.record_success(&identity);
        }
        let usage = rotator.stats().usage["10.0.0.1"].clone();
        assert!(usage.success_rate > 0.99 && usage.success_rate <= 1.0);
    }

    #[test]
    fn failures_block_identity_until_cooldown() {
        let identity = relay("smtp1.test", "10.0.0.1");
        let rotator = rotator_with(vec![identity.clone()], |c| {
            c.retry_delay = Duration::from_millis(5); // cooldown 50ms
        });
        for _ in 0..5 {
            rotator.record_failure(&identity, "refused");
        }
        assert!(matches!(
            rotator.select_identity(),
            Err(AppError::NoAvailableRelay(_))
        ));

        std::thread::sleep(Duration::from_millis(60));
        let selected = rotator.select_identity().expect("cooldown elapsed");
        assert_eq!(selected.key(), "10.0.0.1");
        // Unblocking also resets the failure streak.
        assert_eq!(rotator.stats().usage["10.0.0.1"].consecutive_failures, 0);
    }

    #[test]
    fn ceiling_exhaustion_yields_none_available() {
        let identity = relay("smtp1.test", "10.0.0.1");
        let rotator = rotator_with(vec![identity.clone()], |c| {
            c.provider_limits.get_mut("default").unwrap().max_per_ip = 2;
        });
        rotator.record_success(&identity);
        rotator.record_success(&identity);
        assert!(matches!(
            rotator.select_identity(),
            Err(AppError::NoAvailableRelay(_))
        ));
        // The snapshot agrees with selection: at the ceiling means unavailable.
        let stats = rotator.stats();
        assert_eq!(stats.available_identities, 0);
        assert!(stats.blocked_ips.is_empty());
    }

    #[test]
    fn region_selects_the_provider_ceiling() {
        let mut gmail_bound = relay("smtp1.test", "10.0.0.1");
        gmail_bound.region = "gmail".to_string();
        let mut elsewhere = relay("smtp2.test", "10.0.0.2");
        elsewhere.region = "antarctica".to_string();
        let rotator = rotator_with(vec![gmail_bound.clone(), elsewhere.clone()], |c| {
            c.provider_limits.get_mut("gmail").unwrap().max_per_ip = 1;
        });
        rotator.record_success(&gmail_bound);
        rotator.record_success(&elsewhere);
        // The gmail ceiling binds only the identity whose region names it;
        // an unrecognized region falls back to the default ceiling.
        assert!(!rotator.is_within_limit(&gmail_bound));
        assert!(rotator.is_within_limit(&elsewhere));
    }

    #[test]
    fn selection_prefers_less_used_identity() {
        let busy = relay("smtp1.test", "10.0.0.1");
        let idle = relay("smtp2.test", "10.0.0.2");
        let rotator = rotator_with(vec![busy.clone(), idle.clone()], |_| {});
        for _ in 0..4 {
            rotator.record_success(&busy);
        }
        let selected = rotator.select_identity().unwrap();
        assert_eq!(selected.key(), "10.0.0.2");
    }

    #[test]
    fn daily_reset_clears_blocks_and_counters() {
        let identity = relay("smtp1.test", "10.0.0.1");
        let rotator = rotator_with(vec![identity.clone()], |_| {});
        for _ in 0..6 {
            rotator.record_failure(&identity, "refused");
        }
        assert!(rotator.select_identity().is_err());
        rotator.reset_usage();
        assert!(rotator.select_identity().is_ok());
        assert_eq!(rotator.stats().usage["10.0.0.1"].request_count, 0);
    }

    #[test]
    fn availability_filter_is_honoured() {
        let a = relay("smtp1.test", "10.0.0.1");
        let b = relay("smtp2.test", "10.0.0.2");
        let rotator = rotator_with(vec![a, b], |_| {});
        let selected = rotator
            .select_identity_with(|identity| identity.key() == "10.0.0.2")
            .unwrap();
        assert_eq!(selected.key(), "10.0.0.2");
    }
}
