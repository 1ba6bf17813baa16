//! In-memory implementation of every store trait.
//!
//! Collections live in `HashMap`s behind `tokio::sync::RwLock`s. State is lost
//! on restart and is not shared between processes, so this back-end is for
//! tests and local development. Writes that touch two collections take the
//! locks in a fixed order (bookings before cancellations) so they stay atomic
//! with respect to each other.
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookingStore, Directory, NotificationStore, StoreError, StoreResult};
use crate::jobs::JobQueue;
use crate::models::{
    ActiveTicketsUpdate, Booking, BookingConfirmation, BookingStatus, Cancellation, ChargeRule,
    DeliveryStatus, Event, InboxEntry, Job, JobStatus, MasterNotification, Notification, User,
    UserNotification,
};

#[derive(Default)]
pub struct InMemoryStore {
    events: RwLock<HashMap<Uuid, Event>>,
    users: RwLock<HashMap<Uuid, User>>,
    charge_rules: RwLock<Vec<ChargeRule>>,
    bookings: RwLock<HashMap<Uuid, Booking>>,
    cancellations: RwLock<Vec<Cancellation>>,
    masters: RwLock<HashMap<Uuid, MasterNotification>>,
    user_notifications: RwLock<Vec<UserNotification>>,
    notifications: RwLock<Vec<Notification>>,
    jobs: RwLock<Vec<Job>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        self.events.write().await.insert(event.id, event);
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn insert_charge_rule(&self, rule: ChargeRule) {
        self.charge_rules.write().await.push(rule);
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.read().await.clone()
    }

    pub async fn user_notifications_for(&self, notification_id: Uuid) -> Vec<UserNotification> {
        self.user_notifications
            .read()
            .await
            .iter()
            .filter(|n| n.notification_id == notification_id)
            .cloned()
            .collect()
    }
}

fn page<T: Clone>(items: &[T], offset: u64, limit: u64) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn active_charge_rules(&self) -> StoreResult<Vec<ChargeRule>> {
        Ok(self
            .charge_rules
            .read()
            .await
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect())
    }

    async fn active_charge_rule(&self, name: &str) -> StoreResult<Option<ChargeRule>> {
        Ok(self
            .charge_rules
            .read()
            .await
            .iter()
            .find(|r| r.active && r.name == name)
            .cloned())
    }

    async fn insert_booking(&self, booking: Booking) -> StoreResult<Booking> {
        let mut bookings = self.bookings.write().await;
        if bookings
            .values()
            .any(|b| b.booking_code == booking.booking_code)
        {
            return Err(StoreError::Conflict(format!(
                "booking code {} already exists",
                booking.booking_code
            )));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn find_booking_by_order(&self, order_id: &str) -> StoreResult<Option<Booking>> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .find(|b| b.gateway_order_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn attach_order(&self, id: Uuid, order_id: &str) -> StoreResult<Booking> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", id)))?;
        booking.gateway_order_id = Some(order_id.to_string());
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn confirm_booking(
        &self,
        id: Uuid,
        confirmation: BookingConfirmation,
    ) -> StoreResult<Option<Booking>> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", id)))?;
        if booking.status != BookingStatus::Pending {
            return Ok(None);
        }

        booking.status = BookingStatus::Confirmed;
        booking.qr_code_url = Some(confirmation.qr_code_url);
        booking.payment_reference = Some(confirmation.payment_reference);
        if confirmation.gateway_order_id.is_some() {
            booking.gateway_order_id = confirmation.gateway_order_id;
        }
        booking.amount_paid = confirmation.amount_paid;
        booking.confirmed_via = Some(confirmation.source);
        booking.confirmed_at = Some(confirmation.confirmed_at);
        booking.updated_at = confirmation.confirmed_at;
        Ok(Some(booking.clone()))
    }

    async fn cancellations(&self, booking_id: Uuid) -> StoreResult<Vec<Cancellation>> {
        let mut ledger: Vec<Cancellation> = self
            .cancellations
            .read()
            .await
            .iter()
            .filter(|c| c.booking_id == booking_id)
            .cloned()
            .collect();
        ledger.sort_by(|a, b| a.cancelled_at.cmp(&b.cancelled_at));
        Ok(ledger)
    }

    async fn append_cancellation(
        &self,
        cancellation: Cancellation,
        update: ActiveTicketsUpdate,
    ) -> StoreResult<Booking> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&cancellation.booking_id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", cancellation.booking_id)))?;
        if booking.tickets.quantity != update.expected_active {
            return Err(StoreError::Conflict(
                "booking was modified concurrently".to_string(),
            ));
        }

        // Ledger first: a failure between the two writes under-reports.
        self.cancellations.write().await.push(cancellation.clone());

        booking.tickets.quantity = update.new_active;
        booking.status = update.new_status;
        booking.updated_at = cancellation.cancelled_at;
        Ok(booking.clone())
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn insert_master(&self, master: MasterNotification) -> StoreResult<MasterNotification> {
        self.masters.write().await.insert(master.id, master.clone());
        Ok(master)
    }

    async fn get_master(&self, id: Uuid) -> StoreResult<Option<MasterNotification>> {
        Ok(self.masters.read().await.get(&id).cloned())
    }

    async fn insert_user_notifications(&self, records: Vec<UserNotification>) -> StoreResult<u64> {
        let mut stored = self.user_notifications.write().await;
        let mut seen: HashSet<(Uuid, Uuid)> = stored
            .iter()
            .map(|n| (n.user_id, n.notification_id))
            .collect();

        let mut inserted = 0;
        for record in records {
            if seen.insert((record.user_id, record.notification_id)) {
                stored.push(record);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn claim_user_notifications(
        &self,
        notification_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<Vec<UserNotification>> {
        let mut stored = self.user_notifications.write().await;
        let claimed = stored
            .iter_mut()
            .filter(|n| n.notification_id == notification_id)
            .filter(|n| match n.status {
                DeliveryStatus::Pending => true,
                DeliveryStatus::Sending => n.updated_at < stale_before,
                _ => false,
            })
            .map(|record| {
                record.status = DeliveryStatus::Sending;
                record.updated_at = now;
                record.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn set_delivery_status(&self, id: Uuid, status: DeliveryStatus) -> StoreResult<()> {
        let mut stored = self.user_notifications.write().await;
        if let Some(record) = stored
            .iter_mut()
            .find(|n| n.id == id && n.status == DeliveryStatus::Sending)
        {
            record.status = status;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn inbox(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(u64, Vec<InboxEntry>)> {
        let masters = self.masters.read().await;
        let mut records: Vec<UserNotification> = self
            .user_notifications
            .read()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = records.len() as u64;
        let entries = page(&records, offset, limit)
            .into_iter()
            .filter_map(|record| {
                masters
                    .get(&record.notification_id)
                    .cloned()
                    .map(|notification| InboxEntry {
                        record,
                        notification,
                    })
            })
            .collect();
        Ok((total, entries))
    }

    async fn mark_read(&self, ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<u64> {
        let mut matched = 0;

        let mut records = self.user_notifications.write().await;
        for record in records.iter_mut().filter(|n| ids.contains(&n.id)) {
            record.status = DeliveryStatus::Read;
            record.is_read = true;
            record.read_at = record.read_at.or(Some(at));
            record.updated_at = at;
            matched += 1;
        }
        drop(records);

        // Direct notifications keep their delivery status.
        let mut direct = self.notifications.write().await;
        for notification in direct.iter_mut().filter(|n| ids.contains(&n.id)) {
            notification.is_read = true;
            notification.read_at = notification.read_at.or(Some(at));
            notification.updated_at = at;
            matched += 1;
        }
        Ok(matched)
    }

    async fn insert_notification(&self, notification: Notification) -> StoreResult<Notification> {
        self.notifications.write().await.push(notification.clone());
        Ok(notification)
    }

    async fn record_notification_delivery(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Notification> {
        let mut stored = self.notifications.write().await;
        let notification = stored
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("notification {}", id)))?;
        notification.status = status;
        notification.sent_at = sent_at;
        notification.updated_at = Utc::now();
        Ok(notification.clone())
    }

    async fn notifications_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(u64, Vec<Notification>)> {
        let mut mine: Vec<Notification> = self
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((mine.len() as u64, page(&mine, offset, limit)))
    }
}

#[async_trait]
impl Directory for InMemoryStore {
    async fn event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.events.read().await.get(&id).cloned())
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn active_user_ids(&self) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.is_active())
            .map(|u| u.id)
            .collect())
    }
}

#[async_trait]
impl JobQueue for InMemoryStore {
    async fn enqueue(&self, job: Job) -> StoreResult<Job> {
        self.jobs.write().await.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.iter().find(|j| j.id == id).cloned())
    }

    async fn claim(
        &self,
        now: DateTime<Utc>,
        visibility_timeout: Duration,
    ) -> StoreResult<Option<Job>> {
        let stale_before = now
            - chrono::Duration::from_std(visibility_timeout)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let mut jobs = self.jobs.write().await;

        let next = jobs
            .iter_mut()
            .filter(|j| match j.status {
                JobStatus::Queued => j.run_at <= now,
                JobStatus::Running => j.locked_at.map_or(true, |at| at < stale_before),
                _ => false,
            })
            .min_by_key(|j| (j.run_at, j.created_at));

        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.attempts += 1;
            job.locked_at = Some(now);
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn complete(&self, id: Uuid) -> StoreResult<()> {
        self.update_job(id, |job| {
            job.status = JobStatus::Completed;
            job.locked_at = None;
        })
        .await
    }

    async fn reschedule(&self, id: Uuid, error: &str, run_at: DateTime<Utc>) -> StoreResult<()> {
        self.update_job(id, |job| {
            job.status = JobStatus::Queued;
            job.last_error = Some(error.to_string());
            job.run_at = run_at;
            job.locked_at = None;
        })
        .await
    }

    async fn fail(&self, id: Uuid, error: &str) -> StoreResult<()> {
        self.update_job(id, |job| {
            job.status = JobStatus::Failed;
            job.last_error = Some(error.to_string());
            job.locked_at = None;
        })
        .await
    }

    async fn failed_jobs(&self, limit: u64) -> StoreResult<Vec<Job>> {
        let mut failed: Vec<Job> = self
            .jobs
            .read()
            .await
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        failed.truncate(limit as usize);
        Ok(failed)
    }

    async fn requeue(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))?;
        if job.status != JobStatus::Failed {
            return Err(StoreError::Conflict(format!(
                "job {} is {}, only failed jobs can be retried",
                id,
                job.status.as_str()
            )));
        }
        job.status = JobStatus::Queued;
        job.attempts = 0;
        job.run_at = now;
        job.updated_at = now;
        Ok(job.clone())
    }
}

impl InMemoryStore {
    async fn update_job(&self, id: Uuid, apply: impl FnOnce(&mut Job)) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))?;
        apply(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}
