//! Sliding-window request limiting for the service surface.
//!
//! This protects whatever boundary calls into the engine (one window per
//! caller key, typically an IP); it is unrelated to the per-identity SMTP
//! ceilings enforced by rotation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::core::config::Config;

/// Outcome of admitting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// The caller exceeded its window; retry after the given pause.
    Limited { retry_after: Duration },
}

pub struct RequestLimiter {
    window: Duration,
    max_requests: usize,
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RequestLimiter {
    pub fn new(config: &Config) -> Self {
        Self {
            window: config.api_rate_window,
            max_requests: config.api_rate_max_requests as usize,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limits(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Admits or rejects one request from `key`, recording it when admitted.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let window = entries.entry(key.to_string()).or_default();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.max_requests {
            // A zero ceiling leaves the window empty; the full window length
            // is the honest retry hint then.
            let retry_after = match window.front() {
                Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                None => self.window,
            };
            tracing::warn!(caller = %key, retry_after = ?retry_after, "request rate limit exceeded");
            return RateDecision::Limited { retry_after };
        }
        window.push_back(now);
        RateDecision::Allowed
    }

    /// Drops windows with no recent activity.
    pub fn prune_idle(&self) {
        let now = Instant::now();
        let window = self.window;
        self.entries.lock().retain(|_, timestamps| {
            timestamps
                .back()
                .map(|last| now.duration_since(*last) < window)
                .unwrap_or(false)
        });
    }

    /// Periodic pruning of idle windows; the guard cancels the task on drop.
    pub fn spawn_background_task(self: &Arc<Self>) -> LimiterTasks {
        let limiter = Arc::clone(self);
        let interval = self.window.max(Duration::from_secs(60));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.prune_idle();
            }
        });
        LimiterTasks { handle }
    }
}

pub struct LimiterTasks {
    handle: JoinHandle<()>,
}

impl Drop for LimiterTasks {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_ceiling_then_limits() {
        let limiter = RequestLimiter::with_limits(Duration::from_secs(60), 3);
        for _ in 0..3 {
            assert_eq!(limiter.check("10.1.1.1"), RateDecision::Allowed);
        }
        match limiter.check("10.1.1.1") {
            RateDecision::Limited { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60));
                assert!(retry_after > Duration::ZERO);
            }
            RateDecision::Allowed => panic!("expected limit"),
        }
        // A different caller has its own window.
        assert_eq!(limiter.check("10.2.2.2"), RateDecision::Allowed);
    }

    #[test]
    fn zero_ceiling_rejects_every_request() {
        let limiter = RequestLimiter::with_limits(Duration::from_secs(60), 0);
        match limiter.check("1.2.3.4") {
            RateDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            RateDecision::Allowed => panic!("expected limit"),
        }
    }

    #[test]
    fn window_slides_and_frees_capacity() {
        let limiter = RequestLimiter::with_limits(Duration::from_millis(30), 1);
        assert_eq!(limiter.check("caller"), RateDecision::Allowed);
        assert!(matches!(
            limiter.check("caller"),
            RateDecision::Limited { .. }
        ));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(limiter.check("caller"), RateDecision::Allowed);
    }

    #[test]
    fn prune_drops_idle_callers() {
        let limiter = RequestLimiter::with_limits(Duration::from_millis(10), 5);
        limiter.check("gone");
        std::thread::sleep(Duration::from_millis(20));
        limiter.prune_idle();
        assert!(limiter.entries.lock().is_empty());
    }
}
