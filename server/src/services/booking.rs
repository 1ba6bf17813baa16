use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::charges::{quote, Quote};
use super::locks::KeyedLocks;
use super::tickets::TicketIssuer;
use crate::gateway::PaymentGateway;
use crate::models::booking::generate_booking_code;
use crate::models::{
    Booking, BookingConfirmation, BookingStatus, Cancellation, ChargeRule, ConfirmationSource,
    Event, EventMeta, Tickets, User, UserContact,
};
use crate::store::{BookingStore, Directory};
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct BookingSettings {
    /// Names of the charge rules priced into a booking.
    pub charge_names: Vec<String>,
    /// Name of the rule deducted from refunds.
    pub cancellation_fee_rule: String,
    pub payments_enabled: bool,
    pub currency: String,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            charge_names: vec!["GST".to_string(), "Convenience_Fee".to_string()],
            cancellation_fee_rule: "cancellation_fee".to_string(),
            payments_enabled: true,
            currency: "INR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub ticket_quantity: Option<i32>,
    pub booking_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketRequest {
    pub quantity: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateBookingRequest {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub tickets: TicketRequest,
    pub booking_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    #[serde(flatten)]
    pub event: EventMeta,
    #[serde(flatten)]
    pub user: UserContact,
    pub booking_date: NaiveDate,
    pub price_per_ticket: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub charges: BTreeMap<String, Decimal>,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedBooking {
    pub booking_id: Uuid,
    pub booking_code: String,
    pub status: BookingStatus,
    pub subtotal: Decimal,
    pub charges: BTreeMap<String, Decimal>,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub booking_id: Uuid,
    pub order_id: String,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
}

/// How a payment was proven, and what it captured.
#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub payment_reference: String,
    pub gateway_order_id: Option<String>,
    pub amount_paid: Option<Decimal>,
    pub source: ConfirmationSource,
}

impl PaymentDetails {
    pub fn from_client(payment_reference: impl Into<String>) -> Self {
        Self {
            payment_reference: payment_reference.into(),
            gateway_order_id: None,
            amount_paid: None,
            source: ConfirmationSource::Client,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub booking: Booking,
    /// `false` when the booking had already been confirmed.
    pub newly_confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedSummary {
    pub booking: Booking,
    pub event: Option<EventMeta>,
    pub user: Option<UserContact>,
}

/// Converts a rupee amount to paise, rounding to the nearest paisa.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

fn validate_quantity(quantity: Option<i32>) -> AppResult<i32> {
    match quantity {
        Some(q) if q > 0 => Ok(q),
        Some(_) => Err(AppError::ValidationError(
            "Ticket quantity must be at least 1".to_string(),
        )),
        None => Err(AppError::ValidationError(
            "Ticket quantity is required".to_string(),
        )),
    }
}

/// Owns the booking lifecycle up to and including confirmation.
pub struct BookingService {
    bookings: Arc<dyn BookingStore>,
    directory: Arc<dyn Directory>,
    gateway: Arc<dyn PaymentGateway>,
    tickets: TicketIssuer,
    locks: Arc<KeyedLocks<Uuid>>,
    settings: BookingSettings,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        directory: Arc<dyn Directory>,
        gateway: Arc<dyn PaymentGateway>,
        tickets: TicketIssuer,
        locks: Arc<KeyedLocks<Uuid>>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            bookings,
            directory,
            gateway,
            tickets,
            locks,
            settings,
        }
    }

    pub fn settings(&self) -> &BookingSettings {
        &self.settings
    }

    async fn active_event(&self, event_id: Uuid) -> AppResult<Event> {
        self.directory
            .active_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))
    }

    async fn active_user(&self, user_id: Uuid) -> AppResult<User> {
        self.directory
            .active_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    async fn load(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))
    }

    /// Active rules named in the configured charge list.
    async fn booking_charge_rules(&self) -> AppResult<Vec<ChargeRule>> {
        let rules = self.bookings.active_charge_rules().await?;
        Ok(rules
            .into_iter()
            .filter(|rule| self.settings.charge_names.contains(&rule.name))
            .collect())
    }

    async fn price(&self, event: &Event, quantity: i32) -> AppResult<Quote> {
        let rules = self.booking_charge_rules().await?;
        Ok(quote(event.ticket_price, quantity, &rules))
    }

    /// Price preview. Nothing is persisted.
    pub async fn summary(&self, request: SummaryRequest) -> AppResult<BookingSummary> {
        let quantity = validate_quantity(request.ticket_quantity)?;
        let event = self.active_event(request.event_id).await?;
        let user = self.active_user(request.user_id).await?;
        let quote = self.price(&event, quantity).await?;

        Ok(BookingSummary {
            event: EventMeta::from(&event),
            user: UserContact::from(&user),
            booking_date: request.booking_date,
            price_per_ticket: quote.price_per_ticket,
            quantity: quote.quantity,
            subtotal: quote.subtotal,
            charges: quote.charges,
            total_amount: quote.total_amount,
        })
    }

    /// Creates a `pending` booking priced with the charges active right now.
    pub async fn initiate(&self, request: InitiateBookingRequest) -> AppResult<InitiatedBooking> {
        let quantity = validate_quantity(request.tickets.quantity)?;
        let event = self.active_event(request.event_id).await?;
        self.active_user(request.user_id).await?;
        let quote = self.price(&event, quantity).await?;

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            booking_code: generate_booking_code(now),
            user_id: request.user_id,
            event_id: event.id,
            tickets: Tickets {
                original_quantity: quantity,
                quantity,
                price_per_ticket: quote.price_per_ticket,
                subtotal: quote.subtotal,
            },
            charges: quote.charges,
            total_amount: quote.total_amount,
            status: BookingStatus::Pending,
            booking_date: request.booking_date,
            qr_code_url: None,
            payment_reference: None,
            gateway_order_id: None,
            amount_paid: None,
            confirmed_via: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        };

        let booking = self.bookings.insert_booking(booking).await?;
        info!(
            booking_id = %booking.id,
            booking_code = %booking.booking_code,
            total = %booking.total_amount,
            "Booking initiated"
        );

        Ok(InitiatedBooking {
            booking_id: booking.id,
            booking_code: booking.booking_code,
            status: booking.status,
            subtotal: booking.tickets.subtotal,
            charges: booking.charges,
            total_amount: booking.total_amount,
        })
    }

    /// Creates (or returns the existing) gateway order for a pending booking.
    pub async fn create_payment_order(&self, booking_id: Uuid) -> AppResult<PaymentOrder> {
        if !self.settings.payments_enabled {
            return Err(AppError::ValidationError(
                "Online payments are currently disabled".to_string(),
            ));
        }

        let _guard = self.locks.lock(booking_id).await;
        let booking = self.load(booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Booking is {}, only pending bookings can be paid",
                booking.status
            )));
        }

        let amount = to_minor_units(booking.total_amount).ok_or_else(|| {
            AppError::InternalServerError(format!(
                "amount {} does not fit in minor units",
                booking.total_amount
            ))
        })?;

        if let Some(order_id) = booking.gateway_order_id {
            return Ok(PaymentOrder {
                booking_id,
                order_id,
                amount,
                currency: self.settings.currency.clone(),
            });
        }

        let order = self
            .gateway
            .create_order(amount, &self.settings.currency, &booking.booking_code)
            .await?;
        self.bookings.attach_order(booking_id, &order.order_id).await?;

        info!(booking_id = %booking_id, order_id = %order.order_id, amount, "Payment order created");
        Ok(PaymentOrder {
            booking_id,
            order_id: order.order_id,
            amount: order.amount,
            currency: order.currency,
        })
    }

    /// Moves a pending booking to `confirmed` and issues its QR ticket.
    ///
    /// Re-confirming is a no-op that returns the booking as it stands, so
    /// duplicate client calls and webhook replays are harmless.
    pub async fn confirm(
        &self,
        booking_id: Uuid,
        payment: PaymentDetails,
    ) -> AppResult<ConfirmOutcome> {
        if payment.payment_reference.trim().is_empty() {
            return Err(AppError::ValidationError(
                "paymentReference is required".to_string(),
            ));
        }

        let _guard = self.locks.lock(booking_id).await;
        let booking = self.load(booking_id).await?;
        if booking.status.is_paid() {
            info!(booking_id = %booking_id, status = %booking.status, "Booking already confirmed");
            return Ok(ConfirmOutcome {
                booking,
                newly_confirmed: false,
            });
        }

        let qr_code_url = self.tickets.issue(&booking).await?;
        let confirmation = BookingConfirmation {
            qr_code_url,
            payment_reference: payment.payment_reference,
            gateway_order_id: payment.gateway_order_id,
            amount_paid: payment.amount_paid,
            source: payment.source,
            confirmed_at: Utc::now(),
        };

        match self.bookings.confirm_booking(booking_id, confirmation).await? {
            Some(confirmed) => {
                info!(
                    booking_id = %confirmed.id,
                    booking_code = %confirmed.booking_code,
                    via = payment.source.as_str(),
                    "Booking confirmed"
                );
                Ok(ConfirmOutcome {
                    booking: confirmed,
                    newly_confirmed: true,
                })
            }
            None => {
                // Another process confirmed it between our read and write.
                warn!(booking_id = %booking_id, "Booking confirmed concurrently, keeping existing ticket");
                Ok(ConfirmOutcome {
                    booking: self.load(booking_id).await?,
                    newly_confirmed: false,
                })
            }
        }
    }

    /// Client-side checkout callback: checks the gateway signature, then
    /// confirms the booking that owns the order.
    pub async fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> AppResult<ConfirmOutcome> {
        if order_id.is_empty() || payment_id.is_empty() || signature.is_empty() {
            return Err(AppError::ValidationError(
                "orderId, paymentId and signature are required".to_string(),
            ));
        }
        if !self.gateway.verify_signature(order_id, payment_id, signature) {
            return Err(AppError::AuthError("Invalid payment signature".to_string()));
        }

        let booking = self.booking_for_order(order_id).await?;
        self.confirm(
            booking.id,
            PaymentDetails {
                payment_reference: payment_id.to_string(),
                gateway_order_id: Some(order_id.to_string()),
                amount_paid: None,
                source: ConfirmationSource::Client,
            },
        )
        .await
    }

    pub async fn booking_for_order(&self, order_id: &str) -> AppResult<Booking> {
        self.bookings
            .find_booking_by_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No booking for order {}", order_id)))
    }

    /// Full projection of a paid booking. Pending bookings are not visible.
    pub async fn confirmed_summary(&self, booking_id: Uuid) -> AppResult<ConfirmedSummary> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .filter(|b| {
                matches!(
                    b.status,
                    BookingStatus::Confirmed | BookingStatus::PartiallyCancelled
                )
            })
            .ok_or_else(|| {
                AppError::NotFound(format!("No confirmed booking {}", booking_id))
            })?;

        let event = self.directory.event(booking.event_id).await?;
        let user = self.directory.user(booking.user_id).await?;

        Ok(ConfirmedSummary {
            event: event.as_ref().map(EventMeta::from),
            user: user.as_ref().map(UserContact::from),
            booking,
        })
    }

    pub async fn my_bookings(&self, user_id: Uuid) -> AppResult<Vec<Booking>> {
        Ok(self.bookings.bookings_for_user(user_id).await?)
    }

    /// Ledger entries of a booking the requester owns, oldest first.
    pub async fn list_cancellations(
        &self,
        booking_id: Uuid,
        requester_id: Uuid,
    ) -> AppResult<Vec<Cancellation>> {
        let booking = self.load(booking_id).await?;
        if booking.user_id != requester_id {
            return Err(AppError::Forbidden(
                "You can only view cancellations of your own bookings".to_string(),
            ));
        }
        Ok(self.bookings.cancellations(booking_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::gateway::InMemoryBlobStore;
    use crate::models::ChargeType;
    use crate::store::InMemoryStore;
    use crate::test_support::{event, user, FakeGateway};

    struct Fixture {
        store: Arc<InMemoryStore>,
        blobs: Arc<InMemoryBlobStore>,
        gateway: Arc<FakeGateway>,
        service: BookingService,
        event: Event,
        user: User,
    }

    async fn fixture(settings: BookingSettings) -> Fixture {
        let store = Arc::new(InMemoryStore::default());
        let blobs = Arc::new(InMemoryBlobStore::new("https://cdn.test"));
        let gateway = Arc::new(FakeGateway::default());

        store
            .insert_charge_rule(ChargeRule::new("GST", ChargeType::Percentage, dec!(18)))
            .await;
        store
            .insert_charge_rule(ChargeRule::new(
                "Convenience_Fee",
                ChargeType::Fixed,
                dec!(20),
            ))
            .await;
        store
            .insert_charge_rule(ChargeRule::new(
                "cancellation_fee",
                ChargeType::Percentage,
                dec!(10),
            ))
            .await;

        let event = event(dec!(500));
        let user = user("active");
        store.insert_event(event.clone()).await;
        store.insert_user(user.clone()).await;

        let service = BookingService::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            TicketIssuer::new(blobs.clone()),
            Arc::new(KeyedLocks::new()),
            settings,
        );

        Fixture {
            store,
            blobs,
            gateway,
            service,
            event,
            user,
        }
    }

    fn initiate_request(f: &Fixture, quantity: Option<i32>) -> InitiateBookingRequest {
        InitiateBookingRequest {
            user_id: f.user.id,
            event_id: f.event.id,
            tickets: TicketRequest { quantity },
            booking_date: f.event.date_from.unwrap(),
        }
    }

    #[tokio::test]
    async fn summary_and_initiate_agree_on_price() {
        let f = fixture(BookingSettings::default()).await;

        let summary = f
            .service
            .summary(SummaryRequest {
                user_id: f.user.id,
                event_id: f.event.id,
                ticket_quantity: Some(2),
                booking_date: f.event.date_from.unwrap(),
            })
            .await
            .unwrap();
        let booking = f
            .service
            .initiate(initiate_request(&f, Some(2)))
            .await
            .unwrap();

        assert_eq!(summary.subtotal, dec!(1000));
        assert_eq!(summary.charges["GST"], dec!(180.00));
        assert_eq!(summary.charges["Convenience_Fee"], dec!(20));
        assert!(!summary.charges.contains_key("cancellation_fee"));
        assert_eq!(summary.total_amount, dec!(1200.00));
        assert_eq!(booking.total_amount, summary.total_amount);
        assert_eq!(booking.charges, summary.charges);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.booking_code.starts_with("BKNG_"));
    }

    #[tokio::test]
    async fn initiate_validates_input() {
        let f = fixture(BookingSettings::default()).await;

        for quantity in [None, Some(0), Some(-3)] {
            let err = f
                .service
                .initiate(initiate_request(&f, quantity))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)));
        }

        let mut request = initiate_request(&f, Some(1));
        request.event_id = Uuid::new_v4();
        let err = f.service.initiate(request).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn charge_snapshot_survives_rule_changes() {
        let f = fixture(BookingSettings::default()).await;
        let initiated = f
            .service
            .initiate(initiate_request(&f, Some(1)))
            .await
            .unwrap();

        f.store
            .insert_charge_rule(ChargeRule::new("GST", ChargeType::Percentage, dec!(28)))
            .await;

        let stored = f
            .store
            .get_booking(initiated.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.charges["GST"], dec!(90.00));
        assert_eq!(stored.total_amount, initiated.total_amount);
    }

    #[tokio::test]
    async fn confirming_twice_issues_one_ticket() {
        let f = fixture(BookingSettings::default()).await;
        let initiated = f
            .service
            .initiate(initiate_request(&f, Some(2)))
            .await
            .unwrap();

        let first = f
            .service
            .confirm(initiated.booking_id, PaymentDetails::from_client("pay_1"))
            .await
            .unwrap();
        let second = f
            .service
            .confirm(initiated.booking_id, PaymentDetails::from_client("pay_2"))
            .await
            .unwrap();

        assert!(first.newly_confirmed);
        assert!(!second.newly_confirmed);
        assert_eq!(first.booking.status, BookingStatus::Confirmed);
        assert_eq!(second.booking.status, BookingStatus::Confirmed);
        assert_eq!(second.booking.qr_code_url, first.booking.qr_code_url);
        assert_eq!(second.booking.payment_reference.as_deref(), Some("pay_1"));
        assert_eq!(f.blobs.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_confirmations_issue_one_ticket() {
        let f = Arc::new(fixture(BookingSettings::default()).await);
        let initiated = f
            .service
            .initiate(initiate_request(&f, Some(1)))
            .await
            .unwrap();

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let f = f.clone();
                tokio::spawn(async move {
                    f.service
                        .confirm(
                            initiated.booking_id,
                            PaymentDetails::from_client(format!("pay_{}", i)),
                        )
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut newly = 0;
        for attempt in attempts {
            if attempt.await.unwrap().newly_confirmed {
                newly += 1;
            }
        }
        assert_eq!(newly, 1);
        assert_eq!(f.blobs.len().await, 1);
    }

    #[tokio::test]
    async fn confirmed_summary_hides_pending_bookings() {
        let f = fixture(BookingSettings::default()).await;
        let initiated = f
            .service
            .initiate(initiate_request(&f, Some(1)))
            .await
            .unwrap();

        let err = f
            .service
            .confirmed_summary(initiated.booking_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        f.service
            .confirm(initiated.booking_id, PaymentDetails::from_client("pay_1"))
            .await
            .unwrap();
        let summary = f
            .service
            .confirmed_summary(initiated.booking_id)
            .await
            .unwrap();
        assert_eq!(summary.event.unwrap().event_name, "Jazz Night");
        assert_eq!(summary.user.unwrap().user_id, f.user.id);
    }

    #[tokio::test]
    async fn payment_order_is_created_once() {
        let f = fixture(BookingSettings::default()).await;
        let initiated = f
            .service
            .initiate(initiate_request(&f, Some(1)))
            .await
            .unwrap();

        let first = f
            .service
            .create_payment_order(initiated.booking_id)
            .await
            .unwrap();
        let second = f
            .service
            .create_payment_order(initiated.booking_id)
            .await
            .unwrap();

        // 500 + 90 GST + 20 fee = 610.00 rupees
        assert_eq!(first.amount, 61_000);
        assert_eq!(first.currency, "INR");
        assert_eq!(second.order_id, first.order_id);
        assert_eq!(f.gateway.orders_created(), 1);
    }

    #[tokio::test]
    async fn payment_order_requires_enabled_payments_and_pending_booking() {
        let disabled = fixture(BookingSettings {
            payments_enabled: false,
            ..BookingSettings::default()
        })
        .await;
        let initiated = disabled
            .service
            .initiate(initiate_request(&disabled, Some(1)))
            .await
            .unwrap();
        let err = disabled
            .service
            .create_payment_order(initiated.booking_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let f = fixture(BookingSettings::default()).await;
        let initiated = f
            .service
            .initiate(initiate_request(&f, Some(1)))
            .await
            .unwrap();
        f.service
            .confirm(initiated.booking_id, PaymentDetails::from_client("pay_1"))
            .await
            .unwrap();
        let err = f
            .service
            .create_payment_order(initiated.booking_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn verify_payment_checks_the_signature() {
        let f = fixture(BookingSettings::default()).await;
        let initiated = f
            .service
            .initiate(initiate_request(&f, Some(1)))
            .await
            .unwrap();
        let order = f
            .service
            .create_payment_order(initiated.booking_id)
            .await
            .unwrap();

        let err = f
            .service
            .verify_payment(&order.order_id, "pay_1", "00ff")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));

        let signature = FakeGateway::checkout_signature(&order.order_id, "pay_1");
        let outcome = f
            .service
            .verify_payment(&order.order_id, "pay_1", &signature)
            .await
            .unwrap();
        assert!(outcome.newly_confirmed);
        assert_eq!(outcome.booking.confirmed_via, Some(ConfirmationSource::Client));
        assert_eq!(
            outcome.booking.gateway_order_id.as_deref(),
            Some(order.order_id.as_str())
        );
    }

    #[tokio::test]
    async fn my_bookings_are_newest_first() {
        let f = fixture(BookingSettings::default()).await;
        let older = f
            .service
            .initiate(initiate_request(&f, Some(1)))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = f
            .service
            .initiate(initiate_request(&f, Some(3)))
            .await
            .unwrap();

        let ids: Vec<Uuid> = f
            .service
            .my_bookings(f.user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![newer.booking_id, older.booking_id]);

        let err = f
            .service
            .list_cancellations(newer.booking_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn minor_units_round_to_the_paisa() {
        assert_eq!(to_minor_units(dec!(610.00)), Some(61_000));
        assert_eq!(to_minor_units(dec!(0.015)), Some(2));
    }
}
