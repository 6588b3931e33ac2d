use certpulse_common::types::{NotificationPreferences, TrackingRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::channels::ChannelFactory;
use crate::error::NotifyError;
use crate::{AlertKind, ChannelTarget, TrackingSnapshot};

/// Decides which alert, if any, a tracking is due for.
///
/// A status alert wins whenever the status is neither healthy nor expiring.
/// Otherwise an expiry alert is due once the time left is within the
/// owner's upfront window.
pub fn due_alert(
    tracking: &TrackingRecord,
    prefs: &NotificationPreferences,
    now: DateTime<Utc>,
) -> Option<AlertKind> {
    if tracking.info.status.is_alerting() {
        return Some(AlertKind::Status);
    }
    let expires = tracking.info.expires?;
    if expires - now <= prefs.upfront_window() {
        Some(AlertKind::Expiry)
    } else {
        None
    }
}

/// Result of delivering to one channel.
#[derive(Debug)]
pub struct Delivery {
    pub channel: String,
    pub result: Result<(), NotifyError>,
}

/// What `maybe_notify` did for one tracking.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub alert: Option<AlertKind>,
    pub deliveries: Vec<Delivery>,
}

impl DispatchOutcome {
    pub fn failed(&self) -> usize {
        self.deliveries.iter().filter(|d| d.result.is_err()).count()
    }
}

pub struct Dispatcher {
    factory: Arc<dyn ChannelFactory>,
    channel_timeout: Duration,
    span: tracing::Span,
}

impl Dispatcher {
    pub fn new(factory: Arc<dyn ChannelFactory>, channel_timeout: Duration, span: tracing::Span) -> Self {
        Self {
            factory,
            channel_timeout,
            span,
        }
    }

    /// Sends the alert `tracking` is due for to every target of its owner.
    ///
    /// Channel failures and timeouts are logged and recorded in the outcome;
    /// one failing channel never keeps the others from being tried.
    pub async fn maybe_notify(
        &self,
        tracking: &TrackingRecord,
        prefs: &NotificationPreferences,
    ) -> DispatchOutcome {
        let now = Utc::now();
        let Some(alert) = due_alert(tracking, prefs, now) else {
            return DispatchOutcome::default();
        };

        let snapshot = TrackingSnapshot::from_record(tracking, now);
        let mut outcome = DispatchOutcome {
            alert: Some(alert),
            deliveries: Vec::new(),
        };

        for target in ChannelTarget::for_preferences(prefs) {
            let result = self
                .deliver(&target, alert, &snapshot)
                .instrument(self.span.clone())
                .await;
            outcome.deliveries.push(Delivery {
                channel: target.kind().to_string(),
                result,
            });
        }
        outcome
    }

    async fn deliver(
        &self,
        target: &ChannelTarget,
        alert: AlertKind,
        snapshot: &TrackingSnapshot,
    ) -> Result<(), NotifyError> {
        let channel = self.factory.create_channel(target);
        let send = async {
            match alert {
                AlertKind::Status => channel.send_status(snapshot).await,
                AlertKind::Expiry => channel.send_expiry(snapshot).await,
            }
        };

        let result = match tokio::time::timeout(self.channel_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout {
                channel: channel.channel_name().to_string(),
                after_ms: u64::try_from(self.channel_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match &result {
            Ok(()) => tracing::info!(
                channel = channel.channel_name(),
                domain = %snapshot.domain_name,
                alert = %alert,
                "Notification sent"
            ),
            Err(e) => tracing::error!(
                channel = channel.channel_name(),
                domain = %snapshot.domain_name,
                alert = %alert,
                error = %e,
                "Failed to send notification"
            ),
        }
        result
    }
}
