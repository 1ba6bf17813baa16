//! Persistence traits for the booking and notification flows.
//!
//! Two back-ends implement every trait here (and [`crate::jobs::JobQueue`]):
//! [`memory::InMemoryStore`] for tests and local runs, and
//! [`postgres::PgStore`] for deployments.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActiveTicketsUpdate, Booking, BookingConfirmation, Cancellation, ChargeRule, DeliveryStatus,
    Event, InboxEntry, MasterNotification, Notification, User, UserNotification,
};

pub mod memory;
pub mod postgres;
#[cfg(all(test, feature = "pg-tests"))]
mod postgres_tests;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Bookings, their cancellation ledger and the charge rules priced into them.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// All charge rules currently marked active.
    async fn active_charge_rules(&self) -> StoreResult<Vec<ChargeRule>>;

    /// The active rule named `name`, if any.
    async fn active_charge_rule(&self, name: &str) -> StoreResult<Option<ChargeRule>>;

    async fn insert_booking(&self, booking: Booking) -> StoreResult<Booking>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn find_booking_by_order(&self, order_id: &str) -> StoreResult<Option<Booking>>;

    /// Newest first.
    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;

    /// Records the gateway order created for a pending booking.
    async fn attach_order(&self, id: Uuid, order_id: &str) -> StoreResult<Booking>;

    /// Flips a `pending` booking to `confirmed`.
    ///
    /// Returns `Ok(None)` when the booking exists but is no longer pending, so
    /// callers can treat a lost race as an idempotent replay.
    async fn confirm_booking(
        &self,
        id: Uuid,
        confirmation: BookingConfirmation,
    ) -> StoreResult<Option<Booking>>;

    /// Ledger entries for a booking, oldest first.
    async fn cancellations(&self, booking_id: Uuid) -> StoreResult<Vec<Cancellation>>;

    /// Appends a ledger entry and applies `update` to the booking atomically.
    ///
    /// Fails with [`StoreError::Conflict`] if the booking's active count no
    /// longer equals `update.expected_active`; nothing is written then.
    async fn append_cancellation(
        &self,
        cancellation: Cancellation,
        update: ActiveTicketsUpdate,
    ) -> StoreResult<Booking>;
}

/// Broadcasts, their per-user fan-out records and direct notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_master(&self, master: MasterNotification) -> StoreResult<MasterNotification>;

    async fn get_master(&self, id: Uuid) -> StoreResult<Option<MasterNotification>>;

    /// Bulk insert. Rows that already exist for `(user_id, notification_id)`
    /// are skipped; returns how many were inserted.
    async fn insert_user_notifications(&self, records: Vec<UserNotification>) -> StoreResult<u64>;

    /// Moves a broadcast's `pending` records to `sending` and returns them.
    /// Records stuck in `sending` since before `stale_before` are taken over
    /// too. Two concurrent callers never receive the same record.
    async fn claim_user_notifications(
        &self,
        notification_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<Vec<UserNotification>>;

    /// Records a delivery outcome. Only touches records in `sending`.
    async fn set_delivery_status(&self, id: Uuid, status: DeliveryStatus) -> StoreResult<()>;

    /// Newest first, with the total count for the user.
    async fn inbox(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(u64, Vec<InboxEntry>)>;

    /// Marks inbox records and direct notifications read, keeping an earlier
    /// `read_at`. Returns the number of records matched across both.
    async fn mark_read(&self, ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<u64>;

    async fn insert_notification(&self, notification: Notification) -> StoreResult<Notification>;

    async fn record_notification_delivery(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Notification>;

    /// Newest first, with the total count for the user.
    async fn notifications_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(u64, Vec<Notification>)>;
}

/// Read-only view of the event catalogue and user base.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn event(&self, id: Uuid) -> StoreResult<Option<Event>>;

    async fn active_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.event(id).await?.filter(|e| e.is_active))
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn active_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.user(id).await?.filter(User::is_active))
    }

    /// Snapshot of every user that is active right now.
    async fn active_user_ids(&self) -> StoreResult<Vec<Uuid>>;
}
