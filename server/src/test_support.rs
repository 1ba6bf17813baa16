//! Fixtures and fake collaborators shared by unit and HTTP tests.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::gateway::signature::{checkout_message, sign, verify};
use crate::gateway::{GatewayOrder, PaymentGateway, PushMessage, PushSender, UpstreamError};
use crate::models::{Event, User};

pub const TEST_KEY_SECRET: &str = "test-key-secret";
pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

pub fn event(ticket_price: Decimal) -> Event {
    let now = Utc::now();
    Event {
        id: Uuid::new_v4(),
        organizer_id: Uuid::new_v4(),
        title: "Jazz Night".to_string(),
        description: Some("Live quartet".to_string()),
        venue: "Blue Note Hall".to_string(),
        date_from: Some(now.date_naive()),
        date_to: Some(now.date_naive()),
        time_from: Some("19:00".to_string()),
        time_to: Some("23:00".to_string()),
        ticket_price,
        banner_url: Some("https://cdn.test/banners/jazz.png".to_string()),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn user(status: &str) -> User {
    let now = Utc::now();
    let id = Uuid::new_v4();
    User {
        id,
        full_name: "Asha Rao".to_string(),
        email: format!("{}@example.test", id.simple()),
        phone: Some("+919800000000".to_string()),
        status: status.to_string(),
        created_at: now,
        updated_at: now,
    }
}

/// Payment gateway that mints sequential order ids and checks signatures
/// against [`TEST_KEY_SECRET`].
#[derive(Default)]
pub struct FakeGateway {
    orders: AtomicUsize,
}

impl FakeGateway {
    pub fn orders_created(&self) -> usize {
        self.orders.load(Ordering::SeqCst)
    }

    /// The signature a real checkout would hand back to the client.
    pub fn checkout_signature(order_id: &str, payment_id: &str) -> String {
        sign(
            TEST_KEY_SECRET.as_bytes(),
            checkout_message(order_id, payment_id).as_bytes(),
        )
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        _receipt: &str,
    ) -> Result<GatewayOrder, UpstreamError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            order_id: format!("order_test{:04}", n),
            amount: amount_minor,
            currency: currency.to_string(),
        })
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify(
            TEST_KEY_SECRET.as_bytes(),
            checkout_message(order_id, payment_id).as_bytes(),
            signature,
        )
    }
}

/// Records every push; fails for users listed in `fail_for`.
#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<PushMessage>>,
    fail_for: Mutex<Vec<Uuid>>,
}

impl RecordingPush {
    pub fn fail_for(&self, user_id: Uuid) {
        self.fail_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user_id);
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl PushSender for RecordingPush {
    async fn send(&self, message: &PushMessage) -> Result<(), UpstreamError> {
        let unreachable = self
            .fail_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&message.user_id);
        if unreachable {
            return Err(UpstreamError::Rejected {
                service: "push provider",
                message: "unregistered device".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        Ok(())
    }
}
