//! End-to-end validation flows: offline scoring paths plus full SMTP-backed
//! runs against a local server with a pinned exchanger.

mod support;

use std::sync::Arc;

use support::{fast_config, MockSmtpServer};
use veriprobe_core::dns::Resolver;
use veriprobe_core::health::HealthMonitor;
use veriprobe_core::rotation::RelayRotator;
use veriprobe_core::validation::{Orchestrator, ValidationOptions};
use veriprobe_core::Config;

fn offline_options() -> ValidationOptions {
    ValidationOptions {
        check_smtp: false,
        timeout: None,
        validate_dns: false,
        detect_roles: true,
    }
}

fn smtp_only_options() -> ValidationOptions {
    ValidationOptions {
        check_smtp: true,
        timeout: None,
        validate_dns: false,
        detect_roles: true,
    }
}

fn orchestrator_for(server: &MockSmtpServer, config: Arc<Config>) -> Orchestrator {
    Orchestrator::new(config)
        .expect("orchestrator")
        .with_smtp_port(server.port())
        .with_exchange_override(server.host())
}

#[tokio::test]
async fn malformed_input_scores_zero_and_skips_everything_else() {
    let config = Arc::new(fast_config(&["relay-a.test"]));
    let orchestrator = Orchestrator::new(config).expect("orchestrator");

    let result = orchestrator.validate("not-an-email", &offline_options()).await;

    assert!(!result.valid);
    assert_eq!(result.score, 0);
    assert!(result.details.syntax.is_some());
    assert!(result.details.dns.is_none());
    assert!(result.details.smtp.is_none());
    assert!(result.details.domain.is_none());
}

#[tokio::test]
async fn disposable_domain_is_capped_below_the_threshold() {
    let config = Arc::new(fast_config(&["relay-a.test"]));
    let orchestrator = Orchestrator::new(Arc::clone(&config)).expect("orchestrator");

    let result = orchestrator
        .validate("someone@mailinator.com", &offline_options())
        .await;

    assert!(!result.valid);
    assert!(result.score <= config.score_policy.disposable_cap);
    assert!(result
        .suggestions
        .iter()
        .any(|s| s.contains("corporate")));
}

#[tokio::test]
async fn typo_domain_gets_a_suggestion() {
    let config = Arc::new(fast_config(&["relay-a.test"]));
    let orchestrator = Orchestrator::new(config).expect("orchestrator");

    let result = orchestrator
        .validate("user@gamil.com", &offline_options())
        .await;

    let typo = result.details.typo.expect("typo check ran");
    assert!(typo.has_typos);
    assert!(result
        .suggestions
        .iter()
        .any(|s| s.contains("user@gmail.com")));
}

#[tokio::test]
#[ignore = "requires network access"]
async fn free_provider_with_live_dns_scores_seventy_five() {
    let config = Arc::new(fast_config(&["relay-a.test"]));
    let orchestrator = Orchestrator::new(config).expect("orchestrator");

    let options = ValidationOptions {
        check_smtp: false,
        timeout: None,
        validate_dns: true,
        detect_roles: true,
    };
    let result = orchestrator.validate("user@gmail.com", &options).await;

    let dns = result.details.dns.expect("dns leg ran");
    assert!(dns.valid);
    assert_eq!(result.score, 75);
    assert!(result.valid);
}

#[tokio::test]
#[ignore = "requires network access"]
async fn unresolvable_domain_fails_dns_and_stays_invalid() {
    let config = Arc::new(fast_config(&["relay-a.test"]));
    let orchestrator = Orchestrator::new(config).expect("orchestrator");

    let options = ValidationOptions {
        check_smtp: true,
        timeout: None,
        validate_dns: true,
        detect_roles: true,
    };
    let result = orchestrator
        .validate("user@no-such-domain-veriprobe.invalid", &options)
        .await;

    let dns = result.details.dns.expect("dns leg ran");
    assert!(!dns.valid);
    // SMTP is gated on DNS, so the probe never ran.
    assert!(result.details.smtp.is_none());
    assert!(!result.valid);
}

#[tokio::test]
async fn accepted_recipient_verifies_end_to_end() {
    let server = MockSmtpServer::start().await;
    server.add_valid_recipient("ceo@corp-example.test");

    let config = Arc::new(fast_config(&["relay-a.test"]));
    let orchestrator = orchestrator_for(&server, Arc::clone(&config));

    let result = orchestrator
        .validate("ceo@corp-example.test", &smtp_only_options())
        .await;

    let smtp = result.details.smtp.expect("smtp leg ran");
    assert_eq!(smtp.valid, Some(true));
    assert!(!smtp.degraded);
    let catch_all = result.details.catch_all.expect("catch-all leg ran");
    assert_eq!(catch_all.is_catch_all, Some(false));
    // Syntax, reputation, and SMTP each contribute their weight here.
    assert!(result.valid);
    assert_eq!(
        result.score,
        config.score_policy.syntax_points
            + config.score_policy.reputation_points
            + config.score_policy.smtp_points
    );
}

#[tokio::test]
async fn rejected_recipient_fails_the_existence_check() {
    let server = MockSmtpServer::start().await;
    server.add_valid_recipient("ceo@corp-example.test");

    let config = Arc::new(fast_config(&["relay-a.test"]));
    let orchestrator = orchestrator_for(&server, config);

    let result = orchestrator
        .validate("ghost@corp-example.test", &smtp_only_options())
        .await;

    let smtp = result.details.smtp.expect("smtp leg ran");
    assert_eq!(smtp.valid, Some(false));
    assert!(!smtp.degraded);
    assert!(!result.valid);
}

#[tokio::test]
async fn catch_all_domain_leaves_existence_open() {
    let server = MockSmtpServer::start().await;
    server.set_catch_all(true);

    let config = Arc::new(fast_config(&["relay-a.test"]));
    let orchestrator = orchestrator_for(&server, config);

    let result = orchestrator
        .validate("anything@corp-example.test", &smtp_only_options())
        .await;

    let catch_all = result.details.catch_all.expect("catch-all leg ran");
    assert_eq!(catch_all.is_catch_all, Some(true));
    let smtp = result.details.smtp.expect("smtp leg ran");
    assert_eq!(smtp.valid, None);
    assert!(!smtp.degraded);
    assert!(smtp.message.contains("any recipient"));
}

#[tokio::test]
async fn block_replies_rotate_identities_and_degrade_the_verdict() {
    let server = MockSmtpServer::start().await;
    server.set_rcpt_reply("550 too many connections from your IP");

    let config = Arc::new(fast_config(&["relay-a.test", "relay-b.test"]));
    let resolver = Arc::new(Resolver::new(&config).expect("resolver"));
    let rotator = Arc::new(RelayRotator::new(Arc::clone(&config)));
    let health = Arc::new(HealthMonitor::new(Arc::clone(&config)));
    let orchestrator = Orchestrator::from_parts(
        Arc::clone(&config),
        resolver,
        Arc::clone(&rotator),
        health,
    )
    .with_smtp_port(server.port())
    .with_exchange_override(server.host());

    let result = orchestrator
        .validate("bob@corp-example.test", &smtp_only_options())
        .await;

    let smtp = result.details.smtp.expect("smtp leg ran");
    assert!(smtp.degraded);
    // Corporate reputation backs the heuristic answer once probing is spent.
    assert_eq!(smtp.valid, Some(true));

    let stats = rotator.stats();
    let charged: u32 = stats
        .usage
        .values()
        .map(|usage| usage.consecutive_failures)
        .sum();
    assert!(charged >= 2, "block replies must be charged to the senders");
    let used = stats
        .usage
        .values()
        .filter(|usage| usage.request_count > 0)
        .count();
    assert!(used >= 2, "retries must rotate to a different identity");
}
