//! Catch-all detection against a local SMTP server.

mod support;

use std::sync::Arc;

use tokio::net::TcpListener;

use support::{fast_config, MockSmtpServer};
use veriprobe_core::catchall::CatchAllDetector;
use veriprobe_core::dns::Resolver;

fn detector(config: &Arc<veriprobe_core::Config>) -> CatchAllDetector {
    let resolver = Arc::new(Resolver::new(config).expect("resolver"));
    CatchAllDetector::new(Arc::clone(config), resolver)
}

#[tokio::test]
async fn accept_everything_server_is_flagged_as_catch_all() {
    let server = MockSmtpServer::start().await;
    server.set_catch_all(true);

    let config = Arc::new(fast_config(&["relay-a.test"]));
    let verdict = detector(&config)
        .detect_against("corp-example.test", &server.host(), server.port())
        .await;

    assert_eq!(verdict.is_catch_all, Some(true));
    assert!(verdict.confidence > 0.8);
    assert_eq!(verdict.sample_results.len(), config.catchall_probe_count);
    assert!(verdict.sample_results.iter().all(|sample| sample.accepted));
}

#[tokio::test]
async fn selective_server_is_not_catch_all() {
    let server = MockSmtpServer::start().await;
    server.add_valid_recipient("alice@corp-example.test");

    let config = Arc::new(fast_config(&["relay-a.test"]));
    let verdict = detector(&config)
        .detect_against("corp-example.test", &server.host(), server.port())
        .await;

    // Synthetic local parts never collide with the configured mailbox.
    assert_eq!(verdict.is_catch_all, Some(false));
    assert!(verdict.sample_results.iter().all(|sample| !sample.accepted));
}

#[tokio::test]
async fn unreachable_exchanger_leaves_the_verdict_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Arc::new(fast_config(&["relay-a.test"]));
    let verdict = detector(&config)
        .detect_against("corp-example.test", "127.0.0.1", port)
        .await;

    assert_eq!(verdict.is_catch_all, None);
    assert_eq!(verdict.confidence, 0.0);
}
