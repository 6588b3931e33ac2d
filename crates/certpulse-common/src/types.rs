use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Certificates with less than this many days left are reported as
/// [`Status::Expiring`].
pub const LOOKAHEAD_DAYS: i64 = 14;

/// The lookahead window as a duration.
pub fn lookahead_threshold() -> Duration {
    Duration::days(LOOKAHEAD_DAYS)
}

/// Health of a tracked domain's certificate as observed by the last poll.
///
/// # Examples
///
/// ```
/// use certpulse_common::types::Status;
///
/// let status: Status = "offline".parse().unwrap();
/// assert_eq!(status, Status::Offline);
/// assert_eq!(status.to_string(), "offline");
/// // legacy spelling stored by older deployments
/// assert_eq!("expires".parse::<Status>().unwrap(), Status::Expiring);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Expiring,
    Expired,
    /// Certificate verification failed during the handshake.
    Invalid,
    /// The endpoint actively refused the connection.
    Offline,
    /// The probe did not finish before its deadline, or the endpoint did not
    /// answer with a usable TLS server.
    Unresponsive,
}

impl Status {
    /// Classifies a certificate expiry relative to `now`.
    ///
    /// Exactly [`LOOKAHEAD_DAYS`] remaining still counts as healthy.
    ///
    /// ```
    /// use certpulse_common::types::Status;
    /// use chrono::{Duration, Utc};
    ///
    /// let now = Utc::now();
    /// assert_eq!(Status::for_expiry(now + Duration::days(200), now), Status::Healthy);
    /// assert_eq!(Status::for_expiry(now + Duration::days(3), now), Status::Expiring);
    /// assert_eq!(Status::for_expiry(now - Duration::seconds(1), now), Status::Expired);
    /// ```
    pub fn for_expiry(expires: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if expires < now {
            return Status::Expired;
        }
        if expires - now < lookahead_threshold() {
            Status::Expiring
        } else {
            Status::Healthy
        }
    }

    /// Whether this status warrants a status alert on its own.
    pub fn is_alerting(self) -> bool {
        !matches!(self, Status::Healthy | Status::Expiring)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Healthy => "healthy",
            Status::Expiring => "expiring",
            Status::Expired => "expired",
            Status::Invalid => "invalid",
            Status::Offline => "offline",
            Status::Unresponsive => "unresponsive",
        }
    }

    pub const ALL: [Status; 6] = [
        Status::Healthy,
        Status::Expiring,
        Status::Expired,
        Status::Invalid,
        Status::Offline,
        Status::Unresponsive,
    ];
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "healthy" => Ok(Status::Healthy),
            "expiring" | "expires" => Ok(Status::Expiring),
            "expired" => Ok(Status::Expired),
            "invalid" => Ok(Status::Invalid),
            "offline" => Ok(Status::Offline),
            "unresponsive" => Ok(Status::Unresponsive),
            _ => Err(format!("unknown status: {s}")),
        }
    }
}

/// Everything a poll derives about a domain. Replaced as a whole on every
/// classified probe outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTrackingInfo {
    pub server_ip: String,
    /// Organization of the issuing CA, empty when the issuer carries none.
    pub issuer: String,
    pub signature_algo: String,
    pub public_key_algo: String,
    pub encoded_pem: String,
    /// Hex SHA-256 of the leaf's SubjectPublicKeyInfo.
    pub public_key: String,
    /// Hex SHA-256 of the leaf's signature value.
    pub signature: String,
    /// DNS subject alternative names joined with `", "`.
    pub dns_names: String,
    pub key_usage: String,
    pub ext_key_usages: Vec<String>,
    pub expires: Option<DateTime<Utc>>,
    pub status: Status,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub latency_ms: u64,
    /// Last probe error, empty after a successful handshake.
    pub error: String,
}

impl DomainTrackingInfo {
    /// Info for a probe that ended without a certificate.
    pub fn failed(status: Status, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            status,
            error: error.into(),
            latency_ms,
            last_poll_at: Some(Utc::now()),
            ..Self::default()
        }
    }
}

impl Default for DomainTrackingInfo {
    fn default() -> Self {
        Self {
            server_ip: String::new(),
            issuer: String::new(),
            signature_algo: String::new(),
            public_key_algo: String::new(),
            encoded_pem: String::new(),
            public_key: String::new(),
            signature: String::new(),
            dns_names: String::new(),
            key_usage: String::new(),
            ext_key_usages: Vec::new(),
            expires: None,
            // Freshly added trackings have not been probed yet.
            status: Status::Unresponsive,
            last_poll_at: None,
            latency_ms: 0,
            error: String::new(),
        }
    }
}

/// A tracked domain owned by an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub id: i64,
    pub user_id: String,
    pub domain_name: String,
    #[serde(flatten)]
    pub info: DomainTrackingInfo,
}

impl TrackingRecord {
    /// Returns a copy with the derived fields replaced by `info`. Identity is
    /// never touched.
    pub fn with_info(&self, info: DomainTrackingInfo) -> Self {
        Self {
            id: self.id,
            user_id: self.user_id.clone(),
            domain_name: self.domain_name.clone(),
            info,
        }
    }

    /// Whole days until expiry, rounded down. `None` when no certificate has
    /// been observed.
    pub fn days_left(&self, now: DateTime<Utc>) -> Option<i64> {
        self.info.expires.map(|e| (e - now).num_days())
    }

    /// Status for display. A tracking that was never polled reads
    /// `pending` instead of its placeholder status.
    pub fn status_label(&self) -> &'static str {
        match self.info.last_poll_at {
            Some(_) => self.info.status.as_str(),
            None => "pending",
        }
    }
}

/// Notification settings of the account owning a tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    /// Days before expiry at which an expiry alert becomes due. Always > 0.
    pub notify_upfront_days: u32,
    pub default_email: String,
    /// Slack-compatible incoming webhook.
    pub webhook_url: Option<String>,
}

impl NotificationPreferences {
    pub fn upfront_window(&self) -> Duration {
        Duration::days(i64::from(self.notify_upfront_days))
    }
}

/// One entry of a poll batch: a tracking and its owner's preferences.
#[derive(Debug, Clone)]
pub struct PollItem {
    pub tracking: TrackingRecord,
    pub preferences: NotificationPreferences,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_fourteen_days_is_healthy() {
        let now = Utc::now();
        let expires = now + Duration::days(LOOKAHEAD_DAYS);
        assert_eq!(Status::for_expiry(expires, now), Status::Healthy);
        assert_eq!(
            Status::for_expiry(expires - Duration::seconds(1), now),
            Status::Expiring
        );
    }

    #[test]
    fn expiry_at_now_is_expiring_not_expired() {
        let now = Utc::now();
        assert_eq!(Status::for_expiry(now, now), Status::Expiring);
    }

    #[test]
    fn classification_over_range() {
        let now = Utc::now();
        for days in 15..400 {
            assert_eq!(
                Status::for_expiry(now + Duration::days(days), now),
                Status::Healthy,
                "{days} days"
            );
        }
        for hours in 1..(LOOKAHEAD_DAYS * 24) {
            assert_eq!(
                Status::for_expiry(now + Duration::hours(hours), now),
                Status::Expiring,
                "{hours} hours"
            );
        }
        for days in 1..400 {
            assert_eq!(
                Status::for_expiry(now - Duration::days(days), now),
                Status::Expired
            );
        }
    }

    #[test]
    fn status_string_round_trip() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert!("bogus".parse::<Status>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&Status::Unresponsive).unwrap();
        assert_eq!(json, "\"unresponsive\"");
    }

    #[test]
    fn alerting_statuses() {
        assert!(!Status::Healthy.is_alerting());
        assert!(!Status::Expiring.is_alerting());
        assert!(Status::Expired.is_alerting());
        assert!(Status::Invalid.is_alerting());
        assert!(Status::Offline.is_alerting());
        assert!(Status::Unresponsive.is_alerting());
    }

    #[test]
    fn with_info_keeps_identity() {
        let record = TrackingRecord {
            id: 7,
            user_id: "u1".into(),
            domain_name: "example.com".into(),
            info: DomainTrackingInfo::default(),
        };
        let updated = record.with_info(DomainTrackingInfo::failed(Status::Offline, "refused", 3));
        assert_eq!(updated.id, 7);
        assert_eq!(updated.user_id, "u1");
        assert_eq!(updated.domain_name, "example.com");
        assert_eq!(updated.info.status, Status::Offline);
        assert_eq!(updated.info.latency_ms, 3);
        assert!(updated.info.last_poll_at.is_some());
    }

    #[test]
    fn never_polled_tracking_is_pending() {
        let record = TrackingRecord {
            id: 1,
            user_id: "u1".into(),
            domain_name: "example.com".into(),
            info: DomainTrackingInfo::default(),
        };
        assert_eq!(record.info.status, Status::Unresponsive);
        assert_eq!(record.status_label(), "pending");

        let polled = record.with_info(DomainTrackingInfo::failed(Status::Unresponsive, "deadline", 5));
        assert_eq!(polled.status_label(), "unresponsive");
    }
}
