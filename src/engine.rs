//! Process-level wiring: one engine owns the shared components, their
//! background timers, and the plain-data introspection surface a service
//! boundary renders as JSON.

use std::sync::Arc;

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::dns::Resolver;
use crate::health::{HealthMonitor, HealthSummary, HealthTasks};
use crate::ratelimit::{LimiterTasks, RateDecision, RequestLimiter};
use crate::rotation::{RelayRotator, RotatorStats, RotatorTasks};
use crate::validation::{Orchestrator, ValidationOptions, ValidationResult};

pub struct VerificationEngine {
    config: Arc<Config>,
    rotator: Arc<RelayRotator>,
    health: Arc<HealthMonitor>,
    limiter: Arc<RequestLimiter>,
    orchestrator: Orchestrator,
    background: Option<BackgroundTasks>,
}

/// Guards for every recurring task; dropping the set cancels them all.
struct BackgroundTasks {
    _rotator: RotatorTasks,
    _health: HealthTasks,
    _limiter: LimiterTasks,
}

impl VerificationEngine {
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let resolver = Arc::new(Resolver::new(&config)?);
        let rotator = Arc::new(RelayRotator::new(Arc::clone(&config)));
        let health = Arc::new(HealthMonitor::new(Arc::clone(&config)));
        let limiter = Arc::new(RequestLimiter::new(&config));
        let orchestrator = Orchestrator::from_parts(
            Arc::clone(&config),
            resolver,
            Arc::clone(&rotator),
            Arc::clone(&health),
        );
        Ok(Self {
            config,
            rotator,
            health,
            limiter,
            orchestrator,
            background: None,
        })
    }

    /// Starts the periodic timers: daily usage reset, rotation-pointer
    /// advance, health sweeps, limiter pruning. Idempotent.
    pub fn start_background_tasks(&mut self) {
        if self.background.is_some() {
            return;
        }
        self.background = Some(BackgroundTasks {
            _rotator: self.rotator.spawn_background_tasks(),
            _health: self.health.spawn_background_task(),
            _limiter: self.limiter.spawn_background_task(),
        });
        tracing::info!(
            relays = self.config.relays.len(),
            health_interval = ?self.config.health_check_interval,
            "background tasks started"
        );
    }

    /// Validates one address. Callers needing rate limiting should consult
    /// [`Self::admit`] first.
    pub async fn validate(
        &self,
        email: &str,
        options: &ValidationOptions,
    ) -> ValidationResult {
        self.orchestrator.validate(email, options).await
    }

    /// Admission control for the service surface, keyed by caller identity.
    pub fn admit(&self, caller: &str) -> Result<()> {
        match self.limiter.check(caller) {
            RateDecision::Allowed => Ok(()),
            RateDecision::Limited { retry_after } => Err(AppError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            }),
        }
    }

    /// Rotation introspection: identity counts, block set, usage table.
    pub fn relay_stats(&self) -> RotatorStats {
        self.rotator.stats()
    }

    /// Sweeps every relay now and reports the aggregate.
    pub async fn check_health(&self) -> HealthSummary {
        self.health.check_all().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
