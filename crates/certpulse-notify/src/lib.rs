//! Alert delivery for tracked domains.
//!
//! The [`dispatcher::Dispatcher`] decides whether a tracking warrants a
//! status alert or an expiry alert and fans it out to the owner's
//! [`ChannelTarget`]s. Every target is delivered through a
//! [`NotificationChannel`] built by a [`channels::ChannelFactory`]: email
//! (SMTP via lettre, or log-only) and Slack-compatible webhooks.

pub mod channels;
pub mod dispatcher;
pub mod error;


use async_trait::async_trait;
use certpulse_common::types::{NotificationPreferences, Status, TrackingRecord};
use chrono::{DateTime, Utc};
use error::Result;

/// Which alert a tracking is due for. Status alerts take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Status,
    Expiry,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Status => write!(f, "status"),
            AlertKind::Expiry => write!(f, "expiry"),
        }
    }
}

/// Where an owner wants alerts delivered. The set is closed: an email
/// target always exists and a webhook target exists when one is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelTarget {
    Email { address: String },
    Webhook { url: String },
}

impl ChannelTarget {
    /// Targets for an owner, in delivery order.
    ///
    /// # Examples
    ///
    /// ```
    /// use certpulse_common::types::NotificationPreferences;
    /// use certpulse_notify::ChannelTarget;
    ///
    /// let prefs = NotificationPreferences {
    ///     notify_upfront_days: 7,
    ///     default_email: "ops@example.com".into(),
    ///     webhook_url: None,
    /// };
    /// let targets = ChannelTarget::for_preferences(&prefs);
    /// assert_eq!(targets, vec![ChannelTarget::Email { address: "ops@example.com".into() }]);
    /// ```
    pub fn for_preferences(prefs: &NotificationPreferences) -> Vec<ChannelTarget> {
        let mut targets = vec![ChannelTarget::Email {
            address: prefs.default_email.clone(),
        }];
        if let Some(url) = prefs.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            targets.push(ChannelTarget::Webhook {
                url: url.to_string(),
            });
        }
        targets
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChannelTarget::Email { .. } => "email",
            ChannelTarget::Webhook { .. } => "webhook",
        }
    }
}

/// The parts of a tracking an alert message is rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSnapshot {
    pub domain_name: String,
    pub status: Status,
    pub expires: Option<DateTime<Utc>>,
    pub days_left: Option<i64>,
    pub error: String,
}

impl TrackingSnapshot {
    pub fn from_record(record: &TrackingRecord, now: DateTime<Utc>) -> Self {
        Self {
            domain_name: record.domain_name.clone(),
            status: record.info.status,
            expires: record.info.expires,
            days_left: record.days_left(now),
            error: record.info.error.clone(),
        }
    }

    pub fn status_message(&self) -> String {
        format!(
            "Domain {} has a non healthy status: {}",
            self.domain_name, self.status
        )
    }

    pub fn expiry_message(&self) -> String {
        let days = self
            .days_left
            .map(|d| d.to_string())
            .unwrap_or_else(|| "?".to_string());
        format!("Domain {} will expire in {} days", self.domain_name, days)
    }
}

/// A configured delivery path for one [`ChannelTarget`].
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Tells the owner the domain is in a non-healthy state.
    async fn send_status(&self, snapshot: &TrackingSnapshot) -> Result<()>;

    /// Tells the owner the certificate expires within their upfront window.
    async fn send_expiry(&self, snapshot: &TrackingSnapshot) -> Result<()>;

    /// Returns the channel type name (`"email"`, `"webhook"`).
    fn channel_name(&self) -> &str;
}
