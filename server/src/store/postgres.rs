//! Postgres implementation of every store trait.
//!
//! Multi-row invariants are enforced by the database rather than by this
//! process, so several API and worker instances can share one schema:
//! - confirmation is an `UPDATE ... WHERE status = 'pending'`;
//! - a cancellation inserts its ledger row and decrements the active count in
//!   one transaction, guarded by a compare-and-swap on `quantity`;
//! - fan-out inserts rely on `UNIQUE (user_id, notification_id)`;
//! - a delivery run claims its records by moving them to `sending`;
//! - job claims use `FOR UPDATE SKIP LOCKED` so workers never share a job.
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{BookingStore, Directory, NotificationStore, StoreError, StoreResult};
use crate::jobs::JobQueue;
use crate::models::{
    ActiveTicketsUpdate, Booking, BookingConfirmation, Cancellation, ChargeRule, DeliveryStatus,
    Event, InboxEntry, Job, JobKind, MasterNotification, Notification, Tickets, User,
    UserNotification,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        info!("Successfully connected to database");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        info!("Migrations run successfully");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse<T>(value: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(StoreError::Corrupt)
}

#[derive(FromRow)]
struct ChargeRuleRow {
    id: Uuid,
    name: String,
    charge_type: String,
    value: Decimal,
    description: Option<String>,
    active: bool,
}

impl TryFrom<ChargeRuleRow> for ChargeRule {
    type Error = StoreError;

    fn try_from(row: ChargeRuleRow) -> StoreResult<Self> {
        Ok(ChargeRule {
            id: row.id,
            name: row.name,
            charge_type: parse(&row.charge_type)?,
            value: row.value,
            description: row.description,
            active: row.active,
        })
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    booking_code: String,
    user_id: Uuid,
    event_id: Uuid,
    original_quantity: i32,
    quantity: i32,
    price_per_ticket: Decimal,
    subtotal: Decimal,
    charges: Json<BTreeMap<String, Decimal>>,
    total_amount: Decimal,
    status: String,
    booking_date: NaiveDate,
    qr_code_url: Option<String>,
    payment_reference: Option<String>,
    gateway_order_id: Option<String>,
    amount_paid: Option<Decimal>,
    confirmed_via: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> StoreResult<Self> {
        Ok(Booking {
            id: row.id,
            booking_code: row.booking_code,
            user_id: row.user_id,
            event_id: row.event_id,
            tickets: Tickets {
                original_quantity: row.original_quantity,
                quantity: row.quantity,
                price_per_ticket: row.price_per_ticket,
                subtotal: row.subtotal,
            },
            charges: row.charges.0,
            total_amount: row.total_amount,
            status: parse(&row.status)?,
            booking_date: row.booking_date,
            qr_code_url: row.qr_code_url,
            payment_reference: row.payment_reference,
            gateway_order_id: row.gateway_order_id,
            amount_paid: row.amount_paid,
            confirmed_via: row.confirmed_via.as_deref().map(parse).transpose()?,
            confirmed_at: row.confirmed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CancellationRow {
    id: Uuid,
    booking_id: Uuid,
    cancelled_by: Uuid,
    number_of_tickets_cancelled: i32,
    reason: String,
    refund_amount: Decimal,
    refund_status: String,
    cancelled_at: DateTime<Utc>,
}

impl TryFrom<CancellationRow> for Cancellation {
    type Error = StoreError;

    fn try_from(row: CancellationRow) -> StoreResult<Self> {
        Ok(Cancellation {
            id: row.id,
            booking_id: row.booking_id,
            cancelled_by: row.cancelled_by,
            number_of_tickets_cancelled: row.number_of_tickets_cancelled,
            reason: row.reason,
            refund_amount: row.refund_amount,
            refund_status: parse(&row.refund_status)?,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(FromRow)]
struct MasterRow {
    id: Uuid,
    title: String,
    message: String,
    kind: String,
    event_id: Option<Uuid>,
    image_url: Option<String>,
    deep_link: Option<String>,
    metadata: Json<Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MasterRow> for MasterNotification {
    type Error = StoreError;

    fn try_from(row: MasterRow) -> StoreResult<Self> {
        Ok(MasterNotification {
            id: row.id,
            title: row.title,
            message: row.message,
            kind: parse(&row.kind)?,
            event_id: row.event_id,
            image_url: row.image_url,
            deep_link: row.deep_link,
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct UserNotificationRow {
    id: Uuid,
    user_id: Uuid,
    notification_id: Uuid,
    status: String,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserNotificationRow> for UserNotification {
    type Error = StoreError;

    fn try_from(row: UserNotificationRow) -> StoreResult<Self> {
        Ok(UserNotification {
            id: row.id,
            user_id: row.user_id,
            notification_id: row.notification_id,
            status: parse(&row.status)?,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct InboxRow {
    #[sqlx(flatten)]
    record: UserNotificationRow,
    master_title: String,
    master_message: String,
    master_kind: String,
    master_event_id: Option<Uuid>,
    master_image_url: Option<String>,
    master_deep_link: Option<String>,
    master_metadata: Json<Value>,
    master_created_at: DateTime<Utc>,
}

impl TryFrom<InboxRow> for InboxEntry {
    type Error = StoreError;

    fn try_from(row: InboxRow) -> StoreResult<Self> {
        let notification = MasterNotification {
            id: row.record.notification_id,
            title: row.master_title,
            message: row.master_message,
            kind: parse(&row.master_kind)?,
            event_id: row.master_event_id,
            image_url: row.master_image_url,
            deep_link: row.master_deep_link,
            metadata: row.master_metadata.0,
            created_at: row.master_created_at,
        };
        Ok(InboxEntry {
            record: row.record.try_into()?,
            notification,
        })
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    event_id: Option<Uuid>,
    title: String,
    body: String,
    kind: String,
    priority: String,
    image_url: Option<String>,
    deep_link: Option<String>,
    status: String,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    source: String,
    metadata: Json<Value>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> StoreResult<Self> {
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            event_id: row.event_id,
            title: row.title,
            body: row.body,
            kind: parse(&row.kind)?,
            priority: parse(&row.priority)?,
            image_url: row.image_url,
            deep_link: row.deep_link,
            status: parse(&row.status)?,
            is_read: row.is_read,
            read_at: row.read_at,
            source: parse(&row.source)?,
            metadata: row.metadata.0,
            sent_at: row.sent_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    kind: Json<JobKind>,
    status: String,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    run_at: DateTime<Utc>,
    locked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> StoreResult<Self> {
        Ok(Job {
            id: row.id,
            kind: row.kind.0,
            status: parse(&row.status)?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            last_error: row.last_error,
            run_at: row.run_at,
            locked_at: row.locked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl BookingStore for PgStore {
    async fn active_charge_rules(&self) -> StoreResult<Vec<ChargeRule>> {
        let rows = sqlx::query_as::<_, ChargeRuleRow>(
            "SELECT id, name, charge_type, value, description, active
             FROM charge_rules WHERE active ORDER BY created_at, name",
        )
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn active_charge_rule(&self, name: &str) -> StoreResult<Option<ChargeRule>> {
        sqlx::query_as::<_, ChargeRuleRow>(
            "SELECT id, name, charge_type, value, description, active
             FROM charge_rules WHERE active AND name = $1
             ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .map(ChargeRule::try_from)
        .transpose()
    }

    async fn insert_booking(&self, booking: Booking) -> StoreResult<Booking> {
        let result = sqlx::query(
            "INSERT INTO bookings (
                id, booking_code, user_id, event_id, original_quantity, quantity,
                price_per_ticket, subtotal, charges, total_amount, status, booking_date,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(booking.id)
        .bind(&booking.booking_code)
        .bind(booking.user_id)
        .bind(booking.event_id)
        .bind(booking.tickets.original_quantity)
        .bind(booking.tickets.quantity)
        .bind(booking.tickets.price_per_ticket)
        .bind(booking.tickets.subtotal)
        .bind(Json(&booking.charges))
        .bind(booking.total_amount)
        .bind(booking.status.as_str())
        .bind(booking.booking_date)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(booking),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                StoreError::Conflict(format!("booking code {} already exists", booking.booking_code)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Booking::try_from)
            .transpose()
    }

    async fn find_booking_by_order(&self, order_id: &str) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE gateway_order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Booking::try_from)
            .transpose()
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn attach_order(&self, id: Uuid, order_id: &str) -> StoreResult<Booking> {
        sqlx::query_as::<_, BookingRow>(
            "UPDATE bookings SET gateway_order_id = $2, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("booking {}", id)))?
        .try_into()
    }

    async fn confirm_booking(
        &self,
        id: Uuid,
        confirmation: BookingConfirmation,
    ) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(
            "UPDATE bookings SET
                status = 'confirmed',
                qr_code_url = $2,
                payment_reference = $3,
                gateway_order_id = COALESCE($4, gateway_order_id),
                amount_paid = $5,
                confirmed_via = $6,
                confirmed_at = $7,
                updated_at = $7
             WHERE id = $1 AND status = 'pending'
             RETURNING *",
        )
        .bind(id)
        .bind(&confirmation.qr_code_url)
        .bind(&confirmation.payment_reference)
        .bind(confirmation.gateway_order_id.as_deref())
        .bind(confirmation.amount_paid)
        .bind(confirmation.source.as_str())
        .bind(confirmation.confirmed_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None if self.get_booking(id).await?.is_some() => Ok(None),
            None => Err(StoreError::NotFound(format!("booking {}", id))),
        }
    }

    async fn cancellations(&self, booking_id: Uuid) -> StoreResult<Vec<Cancellation>> {
        let rows = sqlx::query_as::<_, CancellationRow>(
            "SELECT * FROM cancellations WHERE booking_id = $1 ORDER BY cancelled_at, id",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn append_cancellation(
        &self,
        cancellation: Cancellation,
        update: ActiveTicketsUpdate,
    ) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO cancellations (
                id, booking_id, cancelled_by, number_of_tickets_cancelled, reason,
                refund_amount, refund_status, cancelled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(cancellation.id)
        .bind(cancellation.booking_id)
        .bind(cancellation.cancelled_by)
        .bind(cancellation.number_of_tickets_cancelled)
        .bind(&cancellation.reason)
        .bind(cancellation.refund_amount)
        .bind(cancellation.refund_status.as_str())
        .bind(cancellation.cancelled_at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, BookingRow>(
            "UPDATE bookings SET quantity = $2, status = $3, updated_at = $4
             WHERE id = $1 AND quantity = $5
             RETURNING *",
        )
        .bind(cancellation.booking_id)
        .bind(update.new_active)
        .bind(update.new_status.as_str())
        .bind(cancellation.cancelled_at)
        .bind(update.expected_active)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                tx.commit().await?;
                row.try_into()
            }
            None => {
                tx.rollback().await?;
                Err(StoreError::Conflict(
                    "booking was modified concurrently".to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_master(&self, master: MasterNotification) -> StoreResult<MasterNotification> {
        sqlx::query(
            "INSERT INTO master_notifications (
                id, title, message, kind, event_id, image_url, deep_link, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(master.id)
        .bind(&master.title)
        .bind(&master.message)
        .bind(master.kind.as_str())
        .bind(master.event_id)
        .bind(master.image_url.as_deref())
        .bind(master.deep_link.as_deref())
        .bind(Json(&master.metadata))
        .bind(master.created_at)
        .execute(&self.pool)
        .await?;
        Ok(master)
    }

    async fn get_master(&self, id: Uuid) -> StoreResult<Option<MasterNotification>> {
        sqlx::query_as::<_, MasterRow>("SELECT * FROM master_notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(MasterNotification::try_from)
            .transpose()
    }

    async fn insert_user_notifications(&self, records: Vec<UserNotification>) -> StoreResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let user_ids: Vec<Uuid> = records.iter().map(|r| r.user_id).collect();
        let notification_ids: Vec<Uuid> = records.iter().map(|r| r.notification_id).collect();
        let statuses: Vec<String> = records
            .iter()
            .map(|r| r.status.as_str().to_string())
            .collect();
        let created: Vec<DateTime<Utc>> = records.iter().map(|r| r.created_at).collect();

        let result = sqlx::query(
            "INSERT INTO user_notifications (
                id, user_id, notification_id, status, is_read, created_at, updated_at
            )
            SELECT r.id, r.user_id, r.notification_id, r.status, FALSE, r.created_at, r.created_at
            FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::text[], $5::timestamptz[])
                AS r(id, user_id, notification_id, status, created_at)
            ON CONFLICT (user_id, notification_id) DO NOTHING",
        )
        .bind(&ids)
        .bind(&user_ids)
        .bind(&notification_ids)
        .bind(&statuses)
        .bind(&created)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn claim_user_notifications(
        &self,
        notification_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<Vec<UserNotification>> {
        let rows = sqlx::query_as::<_, UserNotificationRow>(
            "UPDATE user_notifications SET status = 'sending', updated_at = $2
             WHERE id IN (
                 SELECT id FROM user_notifications
                 WHERE notification_id = $1
                   AND (status = 'pending' OR (status = 'sending' AND updated_at < $3))
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, user_id, notification_id, status, is_read, read_at,
                       created_at, updated_at",
        )
        .bind(notification_id)
        .bind(now)
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn set_delivery_status(&self, id: Uuid, status: DeliveryStatus) -> StoreResult<()> {
        sqlx::query(
            "UPDATE user_notifications SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status = 'sending'",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn inbox(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(u64, Vec<InboxEntry>)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_notifications WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query_as::<_, InboxRow>(
            "SELECT un.id, un.user_id, un.notification_id, un.status, un.is_read, un.read_at,
                    un.created_at, un.updated_at,
                    m.title AS master_title, m.message AS master_message, m.kind AS master_kind,
                    m.event_id AS master_event_id, m.image_url AS master_image_url,
                    m.deep_link AS master_deep_link, m.metadata AS master_metadata,
                    m.created_at AS master_created_at
             FROM user_notifications un
             JOIN master_notifications m ON m.id = un.notification_id
             WHERE un.user_id = $1
             ORDER BY un.created_at DESC, un.id
             OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok((total.max(0) as u64, convert_all(rows)?))
    }

    async fn mark_read(&self, ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let records = sqlx::query(
            "UPDATE user_notifications
             SET status = 'read', is_read = TRUE, read_at = COALESCE(read_at, $2), updated_at = $2
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        // Direct notifications keep their delivery status.
        let direct = sqlx::query(
            "UPDATE notifications
             SET is_read = TRUE, read_at = COALESCE(read_at, $2), updated_at = $2
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(records.rows_affected() + direct.rows_affected())
    }

    async fn insert_notification(&self, notification: Notification) -> StoreResult<Notification> {
        sqlx::query(
            "INSERT INTO notifications (
                id, user_id, event_id, title, body, kind, priority, image_url, deep_link,
                status, is_read, read_at, source, metadata, sent_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.event_id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.kind.as_str())
        .bind(notification.priority.as_str())
        .bind(notification.image_url.as_deref())
        .bind(notification.deep_link.as_deref())
        .bind(notification.status.as_str())
        .bind(notification.is_read)
        .bind(notification.read_at)
        .bind(notification.source.as_str())
        .bind(Json(&notification.metadata))
        .bind(notification.sent_at)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(notification)
    }

    async fn record_notification_delivery(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Notification> {
        sqlx::query_as::<_, NotificationRow>(
            "UPDATE notifications SET status = $2, sent_at = $3, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(sent_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("notification {}", id)))?
        .try_into()
    }

    async fn notifications_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(u64, Vec<Notification>)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE user_id = $1
             ORDER BY created_at DESC, id OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok((total.max(0) as u64, convert_all(rows)?))
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(
            sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn active_user_ids(&self) -> StoreResult<Vec<Uuid>> {
        Ok(
            sqlx::query_scalar("SELECT id FROM users WHERE status = 'active' ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}

#[async_trait]
impl JobQueue for PgStore {
    async fn enqueue(&self, job: Job) -> StoreResult<Job> {
        sqlx::query(
            "INSERT INTO jobs (
                id, kind, status, attempts, max_attempts, last_error, run_at, locked_at,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(job.id)
        .bind(Json(&job.kind))
        .bind(job.status.as_str())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.last_error.as_deref())
        .bind(job.run_at)
        .bind(job.locked_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn claim(
        &self,
        now: DateTime<Utc>,
        visibility_timeout: Duration,
    ) -> StoreResult<Option<Job>> {
        let stale_before = now
            - chrono::Duration::from_std(visibility_timeout)
                .unwrap_or_else(|_| chrono::Duration::zero());

        sqlx::query_as::<_, JobRow>(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1,
                locked_at = $1, updated_at = $1
             WHERE id = (
                SELECT id FROM jobs
                WHERE (status = 'queued' AND run_at <= $1)
                   OR (status = 'running' AND locked_at < $2)
                ORDER BY run_at, created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
             )
             RETURNING *",
        )
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?
        .map(Job::try_from)
        .transpose()
    }

    async fn complete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', locked_at = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reschedule(&self, id: Uuid, error: &str, run_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'queued', last_error = $2, run_at = $3,
                locked_at = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', last_error = $2, locked_at = NULL,
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn failed_jobs(&self, limit: u64) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE status = 'failed' ORDER BY updated_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn requeue(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE jobs SET status = 'queued', attempts = 0, run_at = $2, updated_at = $2
             WHERE id = $1 AND status = 'failed'
             RETURNING *",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => match self.get_job(id).await? {
                Some(job) => Err(StoreError::Conflict(format!(
                    "job {} is {}, only failed jobs can be retried",
                    id,
                    job.status.as_str()
                ))),
                None => Err(StoreError::NotFound(format!("job {}", id))),
            },
        }
    }
}
