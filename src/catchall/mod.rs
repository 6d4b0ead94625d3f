//! Catch-all domain detection.
//!
//! A domain that accepts mail for addresses which cannot exist renders a
//! positive RCPT response meaningless. The detector probes a few synthetic
//! local parts against the top exchanger, reusing one connection with RSET
//! between envelopes, and infers the policy from the acceptance ratio. "Undetermined" is a first-class verdict: a DNS failure
//! or all probes erroring yields `is_catch_all = None`, never `false`.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

use crate::core::config::Config;
use crate::core::error::AppError;
use crate::dns::Resolver;
use crate::smtp::ProbeClient;

/// Outcome of probing one synthetic address.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeSample {
    pub address: String,
    pub accepted: bool,
    pub error: Option<String>,
}

/// The detector's verdict for a domain.
#[derive(Debug, Clone, Serialize)]
pub struct CatchAllVerdict {
    pub is_catch_all: Option<bool>,
    pub confidence: f64,
    pub reason: String,
    pub sample_results: Vec<ProbeSample>,
}

impl CatchAllVerdict {
    fn undetermined(reason: impl Into<String>, samples: Vec<ProbeSample>) -> Self {
        Self {
            is_catch_all: None,
            confidence: 0.0,
            reason: reason.into(),
            sample_results: samples,
        }
    }
}

pub struct CatchAllDetector {
    config: Arc<Config>,
    resolver: Arc<Resolver>,
    client: ProbeClient,
}

impl CatchAllDetector {
    pub fn new(config: Arc<Config>, resolver: Arc<Resolver>) -> Self {
        let client = ProbeClient::new(Arc::clone(&config));
        Self {
            config,
            resolver,
            client,
        }
    }

    /// Resolves the domain's exchangers and samples its acceptance policy.
    pub async fn detect(&self, domain: &str) -> CatchAllVerdict {
        let exchanges = match self.resolver.resolve_mail_exchanges(domain).await {
            Ok(exchanges) => exchanges,
            Err(AppError::NoDnsRecords(_)) | Err(AppError::NxDomain(_)) => {
                return CatchAllVerdict {
                    is_catch_all: Some(false),
                    confidence: 1.0,
                    reason: "No MX records found".to_string(),
                    sample_results: Vec::new(),
                };
            }
            Err(err) => {
                tracing::warn!(domain, error = %err, "catch-all detection aborted at DNS");
                return CatchAllVerdict::undetermined(
                    format!("Unable to determine catch-all status: {err}"),
                    Vec::new(),
                );
            }
        };
        let Some(top) = exchanges.first() else {
            return CatchAllVerdict {
                is_catch_all: Some(false),
                confidence: 1.0,
                reason: "No MX records found".to_string(),
                sample_results: Vec::new(),
            };
        };
        self.detect_against(domain, &top.host, 25).await
    }

    /// Samples the given exchanger directly. Exposed separately so tests and
    /// callers with a known server can skip resolution.
    pub async fn detect_against(&self, domain: &str, exchange_host: &str, port: u16) -> CatchAllVerdict {
        let addresses: Vec<String> = synthetic_local_parts(self.config.catchall_probe_count)
            .into_iter()
            .map(|local| format!("{local}@{domain}"))
            .collect();
        let outcomes = self
            .client
            .probe_acceptance_batch(
                exchange_host,
                port,
                &addresses,
                self.config.catchall_probe_delay,
            )
            .await;
        let samples = addresses
            .into_iter()
            .zip(outcomes)
            .map(|(address, outcome)| match outcome {
                Ok(accepted) => ProbeSample {
                    address,
                    accepted,
                    error: None,
                },
                Err(err) => ProbeSample {
                    address,
                    accepted: false,
                    error: Some(err.to_string()),
                },
            })
            .collect();
        verdict_from_samples(samples)
    }
}

/// Synthetic local parts guaranteed not to collide with real mailboxes:
/// time-seeded and randomized.
fn synthetic_local_parts(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut rand_tag = move || -> String {
        (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect::<String>()
            .to_lowercase()
    };
    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut locals = vec![format!("not-exist-{now_ms}")];
    locals.push(format!("invalid-{}", rand_tag()));
    while locals.len() < count {
        locals.push(format!("probe-{}", rand_tag()));
    }
    locals.truncate(count.max(1));
    locals
}

fn verdict_from_samples(samples: Vec<ProbeSample>) -> CatchAllVerdict {
    let total = samples.len();
    let errored = samples.iter().filter(|s| s.error.is_some()).count();
    if total == 0 || errored == total {
        return CatchAllVerdict::undetermined(
            "Unable to determine catch-all status: no probe completed",
            samples,
        );
    }
    let accepted = samples.iter().filter(|s| s.accepted).count();
    let accept_ratio = accepted as f64 / total as f64;

    if accept_ratio > 0.8 {
        CatchAllVerdict {
            is_catch_all: Some(true),
            confidence: accept_ratio,
            reason: "Domain accepts non-existent addresses".to_string(),
            sample_results: samples,
        }
    } else if accept_ratio > 0.3 {
        CatchAllVerdict {
            is_catch_all: Some(true),
            confidence: accept_ratio,
            reason: "Domain likely has catch-all policy".to_string(),
            sample_results: samples,
        }
    } else {
        CatchAllVerdict {
            is_catch_all: Some(false),
            confidence: 1.0 - accept_ratio,
            reason: "Domain rejects non-existent addresses".to_string(),
            sample_results: samples,
        }
    }
}
