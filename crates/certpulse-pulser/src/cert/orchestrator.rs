use async_trait::async_trait;
use certpulse_common::types::{PollItem, Status, TrackingRecord};
use certpulse_notify::dispatcher::Dispatcher;
use certpulse_storage::TrackingStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::prober::Prober;
use super::{CycleError, ProbeError};

/// Default bound on probes in flight.
pub const DEFAULT_MAX_CONCURRENT: usize = 15;

/// One complete pass over every tracking.
#[async_trait]
pub trait PollCycle: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport, CycleError>;
}

/// Summary of one cycle.
#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    /// Trackings fetched for the cycle.
    pub polled: usize,
    /// Rows written by the bulk update.
    pub updated: usize,
    /// Trackings left untouched because their probe failed internally.
    pub skipped: usize,
    pub by_status: HashMap<Status, usize>,
    pub notifications_failed: usize,
    pub duration: Duration,
}

enum TaskOutcome {
    Probed {
        record: TrackingRecord,
        notifications_failed: usize,
    },
    Failed {
        domain: String,
        error: ProbeError,
    },
}

pub struct PollOrchestrator {
    store: Arc<dyn TrackingStore>,
    prober: Arc<dyn Prober>,
    dispatcher: Arc<Dispatcher>,
    max_concurrent: usize,
    probe_timeout: Duration,
    span: tracing::Span,
}

impl PollOrchestrator {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        prober: Arc<dyn Prober>,
        dispatcher: Arc<Dispatcher>,
        max_concurrent: usize,
        probe_timeout: Duration,
        span: tracing::Span,
    ) -> Self {
        Self {
            store,
            prober,
            dispatcher,
            max_concurrent: max_concurrent.max(1),
            probe_timeout,
            span,
        }
    }

    async fn poll(&self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let items = self
            .store
            .fetch_all_trackings_with_preferences()
            .map_err(CycleError::Fetch)?;

        if items.is_empty() {
            tracing::info!("No trackings to poll");
            return Ok(CycleReport {
                duration: started.elapsed(),
                ..CycleReport::default()
            });
        }

        let polled = items.len();
        tracing::info!(
            count = polled,
            max_concurrent = self.max_concurrent,
            "Polling tracked domains"
        );

        let gate = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for item in items {
            let permit = gate
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| CycleError::GateClosed)?;
            let prober = self.prober.clone();
            let dispatcher = self.dispatcher.clone();
            let deadline = self.probe_timeout;

            tasks.spawn(
                async move {
                    let PollItem {
                        tracking,
                        preferences,
                    } = item;
                    let probed = prober.probe(&tracking.domain_name, deadline).await;
                    drop(permit);

                    match probed {
                        Ok(info) => {
                            let record = tracking.with_info(info);
                            tracing::debug!(
                                domain = %record.domain_name,
                                status = %record.info.status,
                                latency_ms = record.info.latency_ms,
                                "Domain probed"
                            );
                            let outcome = dispatcher.maybe_notify(&record, &preferences).await;
                            TaskOutcome::Probed {
                                record,
                                notifications_failed: outcome.failed(),
                            }
                        }
                        Err(error) => TaskOutcome::Failed {
                            domain: tracking.domain_name,
                            error,
                        },
                    }
                }
                .instrument(self.span.clone()),
            );
        }

        let mut report = CycleReport {
            polled,
            ..CycleReport::default()
        };
        let mut records = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Probed {
                    record,
                    notifications_failed,
                }) => {
                    if record.info.status.is_alerting() {
                        tracing::warn!(
                            domain = %record.domain_name,
                            status = %record.info.status,
                            error = %record.info.error,
                            "Domain is not healthy"
                        );
                    }
                    *report.by_status.entry(record.info.status).or_default() += 1;
                    report.notifications_failed += notifications_failed;
                    records.push(record);
                }
                Ok(TaskOutcome::Failed { domain, error }) => {
                    tracing::error!(domain = %domain, error = %error, "Probe failed internally, tracking left unchanged");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Probe task panicked");
                    report.skipped += 1;
                }
            }
        }

        report.updated = self
            .store
            .bulk_update_trackings(&records)
            .map_err(|source| CycleError::Persist {
                count: records.len(),
                source,
            })?;
        report.duration = started.elapsed();

        tracing::info!(
            polled = report.polled,
            updated = report.updated,
            skipped = report.skipped,
            notifications_failed = report.notifications_failed,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "Poll cycle completed"
        );
        Ok(report)
    }
}

#[async_trait]
impl PollCycle for PollOrchestrator {
    async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        self.poll().instrument(self.span.clone()).await
    }
}
