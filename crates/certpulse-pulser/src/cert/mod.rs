//! The certificate-monitoring engine: probing, orchestration and scheduling.

pub mod extract;
pub mod orchestrator;
pub mod prober;
pub mod scheduler;

/// Errors a probe cannot map to a status. The affected tracking is left
/// untouched for the cycle.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Probe: invalid domain name '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("Probe: TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Probe: peer presented an empty certificate chain")]
    EmptyChain,

    #[error("Probe: {0}")]
    Certificate(String),

    #[error("Probe: dial task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Why a cycle could not complete.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Cycle: failed to fetch trackings: {0}")]
    Fetch(#[source] certpulse_storage::error::StorageError),

    #[error("Cycle: failed to persist {count} trackings: {source}")]
    Persist {
        count: usize,
        #[source]
        source: certpulse_storage::error::StorageError,
    },

    #[error("Cycle: concurrency gate closed")]
    GateClosed,
}
