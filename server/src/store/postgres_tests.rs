//! Postgres store tests against a real database.
//!
//! Every run migrates a fresh schema named after the process, and each test
//! works on its own ids, so tests can share the schema and run in parallel.
//!
//! Run with `FUNORA_TEST_DATABASE_URL=postgres://... cargo test --features pg-tests`.
//! Without a URL the tests log a skip and pass.
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::Connection;
use uuid::Uuid;

use super::{BookingStore, NotificationStore, PgStore, StoreError};
use crate::jobs::JobQueue;
use crate::models::booking::generate_booking_code;
use crate::models::{
    ActiveTicketsUpdate, Booking, BookingConfirmation, BookingStatus, BroadcastType,
    Cancellation, ConfirmationSource, DeliveryStatus, Job, JobKind, NewMasterNotification,
    RefundStatus, Tickets, UserNotification,
};

static SCHEMA_READY: tokio::sync::OnceCell<String> = tokio::sync::OnceCell::const_new();

fn base_url() -> Option<String> {
    let url = std::env::var("FUNORA_TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok();
    if url.is_none() {
        eprintln!("skipping pg-tests: FUNORA_TEST_DATABASE_URL not set");
    }
    url
}

fn url_with_schema(base_url: &str, schema: &str) -> String {
    let options = format!("options=-csearch_path%3D{}", schema);
    if base_url.contains('?') {
        format!("{}&{}", base_url, options)
    } else {
        format!("{}?{}", base_url, options)
    }
}

/// Creates and migrates this run's schema once, returning a URL scoped to it.
async fn schema_url(base_url: &str) -> Result<String, StoreError> {
    SCHEMA_READY
        .get_or_try_init(|| async {
            let schema = format!("funora_test_{}", std::process::id());
            let mut conn = sqlx::PgConnection::connect(base_url).await?;
            sqlx::query(&format!(r#"DROP SCHEMA IF EXISTS "{}" CASCADE"#, schema))
                .execute(&mut conn)
                .await?;
            sqlx::query(&format!(r#"CREATE SCHEMA "{}""#, schema))
                .execute(&mut conn)
                .await?;
            conn.close().await?;

            let url = url_with_schema(base_url, &schema);
            let store = PgStore::connect(&url, 1).await?;
            store.migrate().await?;
            store.pool().close().await;
            Ok::<_, StoreError>(url)
        })
        .await
        .cloned()
}

async fn store() -> Option<PgStore> {
    let base = base_url()?;
    let url = schema_url(&base).await.unwrap();
    Some(PgStore::connect(&url, 4).await.unwrap())
}

fn booking(quantity: i32) -> Booking {
    let now = Utc::now();
    let price = dec!(500);
    Booking {
        id: Uuid::new_v4(),
        booking_code: generate_booking_code(now),
        user_id: Uuid::new_v4(),
        event_id: Uuid::new_v4(),
        tickets: Tickets {
            original_quantity: quantity,
            quantity,
            price_per_ticket: price,
            subtotal: price * Decimal::from(quantity),
        },
        charges: BTreeMap::from([("GST".to_string(), dec!(90))]),
        total_amount: price * Decimal::from(quantity) + dec!(90),
        status: BookingStatus::Pending,
        booking_date: now.date_naive(),
        qr_code_url: None,
        payment_reference: None,
        gateway_order_id: None,
        amount_paid: None,
        confirmed_via: None,
        confirmed_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn confirmation(reference: &str) -> BookingConfirmation {
    BookingConfirmation {
        qr_code_url: format!("https://cdn.test/qr/{}.svg", reference),
        payment_reference: reference.to_string(),
        gateway_order_id: Some(format!("order_{}", reference)),
        amount_paid: Some(dec!(1090)),
        source: ConfirmationSource::Webhook,
        confirmed_at: Utc::now(),
    }
}

fn cancellation(booking: &Booking, tickets: i32) -> Cancellation {
    Cancellation {
        id: Uuid::new_v4(),
        booking_id: booking.id,
        cancelled_by: booking.user_id,
        number_of_tickets_cancelled: tickets,
        reason: "Plans changed".to_string(),
        refund_amount: dec!(450),
        refund_status: RefundStatus::Pending,
        cancelled_at: Utc::now(),
    }
}

async fn confirmed_booking(store: &PgStore, quantity: i32) -> Booking {
    let booking = store.insert_booking(booking(quantity)).await.unwrap();
    let reference = format!("pay_{}", booking.id.simple());
    store
        .confirm_booking(booking.id, confirmation(&reference))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn confirmation_happens_once() {
    let Some(store) = store().await else {
        return;
    };
    let pending = store.insert_booking(booking(2)).await.unwrap();

    let first = store
        .confirm_booking(pending.id, confirmation("pay_first"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, BookingStatus::Confirmed);
    assert_eq!(first.confirmed_via, Some(ConfirmationSource::Webhook));
    assert_eq!(first.charges.get("GST"), Some(&dec!(90)));

    let replay = store
        .confirm_booking(pending.id, confirmation("pay_second"))
        .await
        .unwrap();
    assert!(replay.is_none());

    let stored = store.get_booking(pending.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_reference.as_deref(), Some("pay_first"));

    let err = store
        .confirm_booking(Uuid::new_v4(), confirmation("pay_nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn lost_cancellation_race_rolls_back_the_ledger() {
    let Some(store) = store().await else {
        return;
    };
    let booking = confirmed_booking(&store, 3).await;

    let applied = store
        .append_cancellation(
            cancellation(&booking, 1),
            ActiveTicketsUpdate {
                expected_active: 3,
                new_active: 2,
                new_status: BookingStatus::PartiallyCancelled,
            },
        )
        .await
        .unwrap();
    assert_eq!(applied.tickets.quantity, 2);
    assert_eq!(applied.status, BookingStatus::PartiallyCancelled);

    // Computed from the count before the first cancellation landed.
    let err = store
        .append_cancellation(
            cancellation(&booking, 1),
            ActiveTicketsUpdate {
                expected_active: 3,
                new_active: 2,
                new_status: BookingStatus::PartiallyCancelled,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let ledger = store.cancellations(booking.id).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(crate::models::cancellation::tickets_cancelled(&ledger), 1);
    let stored = store.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.tickets.quantity, 2);
}

#[tokio::test]
async fn fan_out_inserts_skip_existing_recipients() {
    let Some(store) = store().await else {
        return;
    };
    let now = Utc::now();
    let master = store
        .insert_master(
            NewMasterNotification {
                title: "Spring sale".into(),
                message: "All passes 20% off".into(),
                kind: BroadcastType::Promotion,
                event_id: None,
                image_url: None,
                deep_link: None,
                metadata: serde_json::Value::Null,
            }
            .into_master(now),
        )
        .await
        .unwrap();
    let (first_user, second_user) = (Uuid::new_v4(), Uuid::new_v4());

    let inserted = store
        .insert_user_notifications(vec![
            UserNotification::pending(first_user, master.id, now),
            UserNotification::pending(second_user, master.id, now),
        ])
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let replay = store
        .insert_user_notifications(vec![
            UserNotification::pending(first_user, master.id, now),
            UserNotification::pending(second_user, master.id, now),
        ])
        .await
        .unwrap();
    assert_eq!(replay, 0);

    let (total, inbox) = store.inbox(first_user, 0, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(inbox[0].notification.title, "Spring sale");
    assert_eq!(inbox[0].record.status, DeliveryStatus::Pending);
}

#[tokio::test]
async fn concurrent_delivery_claims_never_share_a_record() {
    let Some(store) = store().await else {
        return;
    };
    let now = Utc::now();
    let master = store
        .insert_master(
            NewMasterNotification {
                title: "Lineup announced".into(),
                message: "See who is playing".into(),
                kind: BroadcastType::SystemAnnouncement,
                event_id: None,
                image_url: None,
                deep_link: None,
                metadata: serde_json::Value::Null,
            }
            .into_master(now),
        )
        .await
        .unwrap();
    let records: Vec<UserNotification> = (0..20)
        .map(|_| UserNotification::pending(Uuid::new_v4(), master.id, now))
        .collect();
    store.insert_user_notifications(records).await.unwrap();

    let lease = now - ChronoDuration::minutes(10);
    let (first, second) = tokio::join!(
        store.claim_user_notifications(master.id, now, lease),
        store.claim_user_notifications(master.id, now, lease)
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.len() + second.len(), 20);
    assert!(first.iter().all(|r| second.iter().all(|o| o.id != r.id)));

    let claimed = first.into_iter().chain(second).next().unwrap();
    store
        .set_delivery_status(claimed.id, DeliveryStatus::Sent)
        .await
        .unwrap();
    // Outcomes only apply to claimed records.
    let (_, inbox) = store.inbox(claimed.user_id, 0, 10).await.unwrap();
    assert_eq!(inbox[0].record.status, DeliveryStatus::Sent);
    store
        .set_delivery_status(claimed.id, DeliveryStatus::Failed)
        .await
        .unwrap();
    let (_, inbox) = store.inbox(claimed.user_id, 0, 10).await.unwrap();
    assert_eq!(inbox[0].record.status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn mark_read_reaches_direct_notifications() {
    let Some(store) = store().await else {
        return;
    };
    let now = Utc::now();
    let user_id = Uuid::new_v4();
    let direct = store
        .insert_notification(
            crate::models::NewNotification {
                user_id,
                event_id: None,
                title: "Doors moved".into(),
                body: "Gates now open at 7".into(),
                kind: crate::models::NotificationKind::Reminder,
                priority: crate::models::Priority::High,
                image_url: None,
                deep_link: None,
                source: crate::models::NotificationSource::System,
                metadata: serde_json::Value::Null,
            }
            .into_pending(now),
        )
        .await
        .unwrap();

    let matched = store
        .mark_read(&[direct.id, Uuid::new_v4()], now)
        .await
        .unwrap();
    assert_eq!(matched, 1);
    store
        .mark_read(&[direct.id], now + ChronoDuration::minutes(5))
        .await
        .unwrap();

    let (_, mine) = store.notifications_for_user(user_id, 0, 10).await.unwrap();
    assert!(mine[0].is_read);
    assert_eq!(
        mine[0].read_at.map(|at| at.timestamp_micros()),
        Some(now.timestamp_micros())
    );
    assert_eq!(mine[0].status, DeliveryStatus::Pending);
}

#[tokio::test]
async fn job_claims_skip_locked_rows() {
    let Some(store) = store().await else {
        return;
    };
    // Far in the past so no other test's job can be older.
    let long_ago = Utc::now() - ChronoDuration::days(3650);
    let job = store
        .enqueue(Job::new(
            JobKind::DistributeToUsers {
                master_notification_id: Uuid::new_v4(),
            },
            3,
            long_ago,
        ))
        .await
        .unwrap();

    let now = Utc::now();
    let (first, second) = tokio::join!(
        store.claim(now, Duration::from_secs(300)),
        store.claim(now, Duration::from_secs(300))
    );
    let claimed: Vec<Job> = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .filter(|j| j.id == job.id)
        .collect();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].attempts, 1);

    store.fail(job.id, "push provider down").await.unwrap();
    let requeued = store.requeue(job.id, now).await.unwrap();
    assert_eq!(requeued.attempts, 0);
    let err = store.requeue(job.id, now).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}
