#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tower::ServiceExt;

use funora_server::gateway::InMemoryBlobStore;
use funora_server::models::{ChargeRule, ChargeType, Event, User};
use funora_server::routes::create_routes;
use funora_server::services::{BookingSettings, NotificationSettings};
use funora_server::state::{AppState, Collaborators, ServiceSettings};
use funora_server::store::InMemoryStore;
use funora_server::test_support::{event, user, FakeGateway, RecordingPush, TEST_WEBHOOK_SECRET};

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub push: Arc<RecordingPush>,
    pub state: AppState,
    pub router: Router,
}

/// GST 18%, a flat 20 convenience fee and a 10% cancellation fee.
pub async fn spawn_app() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_charge_rule(ChargeRule::new("GST", ChargeType::Percentage, dec!(18)))
        .await;
    store
        .insert_charge_rule(ChargeRule::new("Convenience_Fee", ChargeType::Fixed, dec!(20)))
        .await;
    store
        .insert_charge_rule(ChargeRule::new(
            "cancellation_fee",
            ChargeType::Percentage,
            dec!(10),
        ))
        .await;

    let blobs = Arc::new(InMemoryBlobStore::new("https://cdn.test"));
    let push = Arc::new(RecordingPush::default());
    let state = AppState::new(
        store.clone(),
        Collaborators {
            payments: Arc::new(FakeGateway::default()),
            blobs: blobs.clone(),
            push: push.clone(),
        },
        ServiceSettings {
            booking: BookingSettings::default(),
            notifications: NotificationSettings::default(),
            webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
            max_job_attempts: 3,
        },
    );
    let router = create_routes(state.clone(), Some("https://app.funora.in"), false);

    TestApp {
        store,
        blobs,
        push,
        state,
        router,
    }
}

impl TestApp {
    pub async fn seed_event(&self, price: Decimal) -> Event {
        let gig = event(price);
        self.store.insert_event(gig.clone()).await;
        gig
    }

    pub async fn seed_user(&self) -> User {
        let fan = user("active");
        self.store.insert_user(fan.clone()).await;
        fan
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        read_json(self.send(request).await).await
    }

    pub async fn post_raw(
        &self,
        uri: &str,
        body: Vec<u8>,
        signature: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-razorpay-signature", HeaderValue::from_str(signature).unwrap());
        }
        let request = builder.body(Body::from(body)).unwrap();
        read_json(self.send(request).await).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        read_json(self.send(request).await).await
    }
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Money travels as decimal strings.
pub fn money(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().unwrap()).unwrap()
}
