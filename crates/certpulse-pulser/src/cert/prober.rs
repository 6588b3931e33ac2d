use async_trait::async_trait;
use certpulse_common::types::{DomainTrackingInfo, Status};
use chrono::Utc;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::extract;
use super::ProbeError;

/// Per-probe deadline used by the orchestrator.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes one domain and classifies its certificate health.
///
/// Every outcome that says something about the domain (success, refusal,
/// verification failure, deadline, transport failure) is returned as `Ok`.
/// `Err` is reserved for cases where nothing trustworthy was learned.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, domain: &str, deadline: Duration)
        -> Result<DomainTrackingInfo, ProbeError>;
}

/// What the dial task brings back from a completed handshake.
struct Handshake {
    peer_ip: String,
    certs: Vec<CertificateDer<'static>>,
}

/// TLS prober verifying against a fixed root store.
pub struct TlsProber {
    connector: TlsConnector,
    port: u16,
}

impl TlsProber {
    /// Prober trusting the Mozilla root program via `webpki-roots`.
    pub fn new(port: u16) -> Result<Self, ProbeError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_root_store(roots, port)
    }

    pub fn with_root_store(roots: RootCertStore, port: u16) -> Result<Self, ProbeError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            port,
        })
    }
}

#[async_trait]
impl Prober for TlsProber {
    async fn probe(
        &self,
        domain: &str,
        deadline: Duration,
    ) -> Result<DomainTrackingInfo, ProbeError> {
        let server_name = ServerName::try_from(domain.to_string()).map_err(|e| {
            ProbeError::InvalidDomain {
                domain: domain.to_string(),
                reason: e.to_string(),
            }
        })?;
        let addr = format!("{domain}:{}", self.port);

        let start = Instant::now();
        let mut dial = tokio::spawn(dial(self.connector.clone(), addr, server_name));

        let joined = match tokio::time::timeout(deadline, &mut dial).await {
            Ok(joined) => joined?,
            Err(_) => {
                dial.abort();
                let latency = elapsed_ms(start);
                tracing::debug!(domain, latency_ms = latency, "Probe deadline exceeded");
                return Ok(DomainTrackingInfo::failed(
                    Status::Unresponsive,
                    format!("deadline of {}ms exceeded", deadline.as_millis()),
                    latency,
                ));
            }
        };
        let latency = elapsed_ms(start);

        match joined {
            Ok(handshake) => {
                let leaf = handshake.certs.first().ok_or(ProbeError::EmptyChain)?;
                extract::tracking_info(leaf.as_ref(), handshake.peer_ip, latency, Utc::now())
            }
            Err(e) => {
                let status = classify_dial_error(&e);
                tracing::debug!(domain, status = %status, error = %e, "Probe failed");
                Ok(DomainTrackingInfo::failed(status, e.to_string(), latency))
            }
        }
    }
}

async fn dial(
    connector: TlsConnector,
    addr: String,
    server_name: ServerName<'static>,
) -> io::Result<Handshake> {
    let tcp = TcpStream::connect(&addr).await?;
    let peer_ip = tcp
        .peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_default();

    let tls = connector.connect(server_name, tcp).await?;
    let (_, conn) = tls.get_ref();
    let certs = conn
        .peer_certificates()
        .map(|certs| certs.to_vec())
        .unwrap_or_default();
    Ok(Handshake { peer_ip, certs })
}

/// Maps a failed dial to a status.
///
/// Refusals mean the host is up but nothing listens; verification errors
/// mean a certificate was presented and rejected. Everything else (DNS,
/// resets, unreachable networks, protocol errors) is a host that did not
/// answer with a usable TLS endpoint.
pub fn classify_dial_error(err: &io::Error) -> Status {
    if err.kind() == io::ErrorKind::ConnectionRefused {
        return Status::Offline;
    }
    if is_verification_error(err) {
        return Status::Invalid;
    }
    Status::Unresponsive
}

fn is_verification_error(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|tls| matches!(tls, rustls::Error::InvalidCertificate(_)))
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
