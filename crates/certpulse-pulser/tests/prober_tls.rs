mod common;

use certpulse_common::types::{DomainTrackingInfo, Status};
use certpulse_pulser::cert::extract::encode_pem;
use certpulse_pulser::cert::prober::{Prober, TlsProber};
use chrono::{Duration as ChronoDuration, Utc};
use common::{refused_port, silent_listener, spawn_tls_server, TestPki, CA_ORGANIZATION};
use std::time::Duration;

const DEADLINE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn trusted_certificate_is_extracted() {
    let pki = TestPki::generate();
    let port = spawn_tls_server(&pki).await;
    let prober = TlsProber::with_root_store(pki.root_store(), port).unwrap();

    let info = prober.probe("127.0.0.1", DEADLINE).await.unwrap();

    assert_eq!(info.status, Status::Healthy, "error: {}", info.error);
    assert!(info.error.is_empty());
    assert_eq!(info.server_ip, "127.0.0.1");
    assert_eq!(info.issuer, CA_ORGANIZATION);
    assert_eq!(info.dns_names, "localhost");
    assert_eq!(info.public_key_algo, "ECDSA");
    assert_eq!(info.signature_algo, "ECDSA-SHA256");
    assert_eq!(info.key_usage, "digital signature");
    assert_eq!(info.ext_key_usages, vec!["server auth".to_string()]);
    assert_eq!(info.public_key.len(), 64);
    assert_eq!(info.signature.len(), 64);
    assert_eq!(info.encoded_pem, encode_pem(pki.leaf_der.as_ref()));
    assert!(info.expires.unwrap() > Utc::now() + ChronoDuration::days(14));
    assert!(info.last_poll_at.is_some());
}

#[tokio::test]
async fn untrusted_certificate_is_invalid() {
    let pki = TestPki::generate();
    let port = spawn_tls_server(&pki).await;
    // Mozilla roots do not know the test CA.
    let prober = TlsProber::new(port).unwrap();

    let info = prober.probe("127.0.0.1", DEADLINE).await.unwrap();

    assert_eq!(info.status, Status::Invalid);
    assert!(!info.error.is_empty());
    assert!(info.expires.is_none());
    assert!(info.encoded_pem.is_empty());
}

#[tokio::test]
async fn refused_connection_is_offline() {
    let port = refused_port().await;
    let prober = TlsProber::new(port).unwrap();

    let info = prober.probe("127.0.0.1", DEADLINE).await.unwrap();

    assert_eq!(info.status, Status::Offline);
    assert!(!info.error.is_empty());
    assert!(info.last_poll_at.is_some());
}

#[tokio::test]
async fn silent_endpoint_hits_the_deadline() {
    let (_listener, port) = silent_listener().await;
    let prober = TlsProber::new(port).unwrap();

    let started = std::time::Instant::now();
    let info = prober
        .probe("127.0.0.1", Duration::from_millis(50))
        .await
        .unwrap();

    assert_eq!(info.status, Status::Unresponsive);
    assert!(info.error.contains("deadline"), "error: {}", info.error);
    assert!(info.latency_ms >= 50);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn one_millisecond_deadline_is_unresponsive() {
    let (_listener, port) = silent_listener().await;
    let prober = TlsProber::new(port).unwrap();

    let info = prober
        .probe("127.0.0.1", Duration::from_millis(1))
        .await
        .unwrap();

    assert_eq!(info.status, Status::Unresponsive);
    assert!(!info.error.is_empty());
}

#[tokio::test]
async fn repeated_probes_agree() {
    let pki = TestPki::generate();
    let port = spawn_tls_server(&pki).await;
    let prober = TlsProber::with_root_store(pki.root_store(), port).unwrap();

    let first = prober.probe("127.0.0.1", DEADLINE).await.unwrap();
    let second = prober.probe("127.0.0.1", DEADLINE).await.unwrap();

    assert_eq!(first.status, Status::Healthy);
    // Everything but the poll timestamp and latency describes the certificate.
    let stable = |mut info: DomainTrackingInfo| {
        info.last_poll_at = None;
        info.latency_ms = 0;
        info
    };
    assert_eq!(stable(first), stable(second));
}
