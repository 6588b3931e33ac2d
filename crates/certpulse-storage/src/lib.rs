//! Persistence for tracked domains and the notification preferences of the
//! accounts owning them.
//!
//! The poll engine only needs [`TrackingStore::fetch_all_trackings_with_preferences`]
//! and [`TrackingStore::bulk_update_trackings`]; the remaining operations
//! exist so trackings can be created and inspected. The default
//! implementation is [`tracking_store::SqliteTrackingStore`].

pub mod domain;
pub mod error;
pub mod tracking_store;


use certpulse_common::types::{NotificationPreferences, PollItem, TrackingRecord};
use error::Result;

pub use tracking_store::SqliteTrackingStore;

/// An account row as far as monitoring is concerned.
///
/// # Examples
///
/// ```
/// use certpulse_storage::AccountRow;
///
/// let account = AccountRow::new("user-1", "ops@example.com");
/// assert_eq!(account.preferences.notify_upfront_days, 7);
/// assert!(account.preferences.webhook_url.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub user_id: String,
    pub preferences: NotificationPreferences,
}

impl AccountRow {
    /// Upfront window new accounts start with.
    pub const DEFAULT_NOTIFY_UPFRONT_DAYS: u32 = 7;

    pub fn new(user_id: &str, default_email: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            preferences: NotificationPreferences {
                notify_upfront_days: Self::DEFAULT_NOTIFY_UPFRONT_DAYS,
                default_email: default_email.to_string(),
                webhook_url: None,
            },
        }
    }
}

/// Persistence backend for trackings.
///
/// Implementations must be `Send + Sync`: the poll orchestrator shares one
/// store across cycles and the CLI uses it from async contexts.
pub trait TrackingStore: Send + Sync {
    /// Creates or replaces the account's notification preferences.
    ///
    /// # Errors
    ///
    /// Returns [`error::StorageError::InvalidValue`] when the upfront window
    /// is zero.
    fn upsert_account(&self, account: &AccountRow) -> Result<()>;

    /// Adds trackings for `user_id`, skipping domains the owner already
    /// tracks. Returns the number of trackings inserted.
    ///
    /// # Errors
    ///
    /// Returns [`error::StorageError::InvalidValue`] naming the first entry
    /// that is not a hostname or IP literal; nothing is inserted then.
    fn create_trackings(&self, user_id: &str, domains: &[String]) -> Result<usize>;

    /// Stops tracking `domain` for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`error::StorageError::TrackingNotFound`] when the owner does
    /// not track the domain.
    fn delete_tracking(&self, user_id: &str, domain: &str) -> Result<()>;

    /// Lists the trackings owned by `user_id`, ordered by domain name.
    fn list_trackings(&self, user_id: &str) -> Result<Vec<TrackingRecord>>;

    /// Every tracking joined with its owner's notification preferences.
    /// Trackings whose owner has no account row are not returned.
    fn fetch_all_trackings_with_preferences(&self) -> Result<Vec<PollItem>>;

    /// Writes the derived fields of every record in one transaction, keyed
    /// by record id. Identity columns are never written. Returns the number
    /// of rows updated; records whose row no longer exists are skipped.
    fn bulk_update_trackings(&self, records: &[TrackingRecord]) -> Result<usize>;
}
