use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;

use super::orchestrator::{CycleReport, PollCycle};
use super::CycleError;

/// Drives poll cycles on a fixed interval until told to stop.
pub struct Scheduler {
    cycle: Arc<dyn PollCycle>,
    interval: Duration,
    span: tracing::Span,
}

impl Scheduler {
    pub fn new(cycle: Arc<dyn PollCycle>, interval: Duration, span: tracing::Span) -> Self {
        Self {
            cycle,
            interval,
            span,
        }
    }

    /// Runs one cycle immediately, then one per tick until `stop` turns
    /// `true` or its sender is dropped.
    ///
    /// A failing first cycle is returned to the caller; later failures are
    /// logged and retried on the next tick. Returns when the last successful
    /// cycle completed.
    pub async fn start(
        &self,
        mut stop: watch::Receiver<bool>,
    ) -> Result<Option<DateTime<Utc>>, CycleError> {
        tracing::info!(
            parent: &self.span,
            interval_secs = self.interval.as_secs_f64(),
            "Poll scheduler started"
        );

        let report = self.cycle.run_cycle().instrument(self.span.clone()).await?;
        let mut last_completed = Some(Utc::now());
        self.log_report(&report);

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.cycle.run_cycle().instrument(self.span.clone()).await {
                        Ok(report) => {
                            last_completed = Some(Utc::now());
                            self.log_report(&report);
                        }
                        Err(e) => {
                            tracing::error!(parent: &self.span, error = %e, "Poll cycle failed");
                        }
                    }
                }
            }
        }

        tracing::info!(
            parent: &self.span,
            last_completed = ?last_completed,
            "Poll scheduler stopped"
        );
        Ok(last_completed)
    }

    fn log_report(&self, report: &CycleReport) {
        if report.skipped > 0 || report.notifications_failed > 0 {
            tracing::warn!(
                parent: &self.span,
                skipped = report.skipped,
                notifications_failed = report.notifications_failed,
                "Poll cycle completed with failures"
            );
        }
    }
}

/// Turns a shutdown future such as `tokio::signal::ctrl_c()` into the stop
/// receiver taken by [`Scheduler::start`].
///
/// If the future fails the error is logged and the sender is kept alive, so
/// the scheduler keeps running instead of stopping on a dropped sender.
pub fn stop_on_signal<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for shutdown signal, polling continues");
                std::future::pending::<()>().await;
            }
        }
    });
    stop_rx
}
