use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::charges::{round2, rule_amount};
use super::locks::KeyedLocks;
use crate::models::cancellation::tickets_cancelled;
use crate::models::{ActiveTicketsUpdate, BookingStatus, Cancellation, RefundStatus};
use crate::store::BookingStore;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub user_id: Uuid,
    pub booking_id: Uuid,
    pub number_of_tickets_to_cancel: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationReceipt {
    pub cancellation_id: Uuid,
    pub refund_amount: Decimal,
    pub refund_status: RefundStatus,
    pub new_booking_status: BookingStatus,
    pub active_tickets: i32,
}

/// Appends cancellations to a booking's ledger and keeps the booking's
/// active ticket count in step with it.
pub struct CancellationLedger {
    bookings: Arc<dyn BookingStore>,
    locks: Arc<KeyedLocks<Uuid>>,
    fee_rule: String,
}

impl CancellationLedger {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        locks: Arc<KeyedLocks<Uuid>>,
        fee_rule: impl Into<String>,
    ) -> Self {
        Self {
            bookings,
            locks,
            fee_rule: fee_rule.into(),
        }
    }

    /// Refund for `count` tickets at `price_per_ticket`, less the active
    /// cancellation fee. Never negative.
    pub async fn refund_for(&self, count: i32, price_per_ticket: Decimal) -> AppResult<Decimal> {
        let refund_subtotal = round2(price_per_ticket * Decimal::from(count));
        let fee = match self.bookings.active_charge_rule(&self.fee_rule).await? {
            Some(rule) => rule_amount(refund_subtotal, &rule),
            None => Decimal::ZERO,
        };
        Ok((refund_subtotal - fee).max(Decimal::ZERO))
    }

    pub async fn cancel_tickets(&self, request: CancelRequest) -> AppResult<CancellationReceipt> {
        let count = match request.number_of_tickets_to_cancel {
            Some(n) if n >= 1 => n,
            _ => {
                return Err(AppError::ValidationError(
                    "numberOfTicketsToCancel must be at least 1".to_string(),
                ))
            }
        };
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                AppError::ValidationError("A cancellation reason is required".to_string())
            })?
            .to_string();

        let _guard = self.locks.lock(request.booking_id).await;

        let booking = self
            .bookings
            .get_booking(request.booking_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Booking {} not found", request.booking_id))
            })?;
        if booking.user_id != request.user_id {
            return Err(AppError::Forbidden(
                "You can only cancel your own bookings".to_string(),
            ));
        }
        if !booking.status.is_cancellable() {
            return Err(AppError::Conflict(format!(
                "A {} booking cannot be cancelled",
                booking.status
            )));
        }

        let ledger = self.bookings.cancellations(booking.id).await?;
        let remaining = booking.tickets.original_quantity - tickets_cancelled(&ledger);
        if remaining != booking.tickets.quantity {
            warn!(
                booking_id = %booking.id,
                stored = booking.tickets.quantity,
                derived = remaining,
                "Active ticket count disagrees with the ledger, using the ledger"
            );
        }
        if count > remaining {
            return Err(AppError::Conflict(format!(
                "Cannot cancel {} tickets, only {} remain active",
                count, remaining
            )));
        }

        let refund_amount = self
            .refund_for(count, booking.tickets.price_per_ticket)
            .await?;
        let active = remaining - count;
        let new_status = BookingStatus::after_cancellation(active);

        let cancellation = Cancellation {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            cancelled_by: request.user_id,
            number_of_tickets_cancelled: count,
            reason,
            refund_amount,
            refund_status: RefundStatus::for_amount(refund_amount),
            cancelled_at: Utc::now(),
        };
        let receipt_id = cancellation.id;
        let refund_status = cancellation.refund_status;

        let updated = self
            .bookings
            .append_cancellation(
                cancellation,
                ActiveTicketsUpdate {
                    expected_active: booking.tickets.quantity,
                    new_active: active,
                    new_status,
                },
            )
            .await?;

        info!(
            booking_id = %updated.id,
            cancellation_id = %receipt_id,
            cancelled = count,
            active = updated.tickets.quantity,
            refund = %refund_amount,
            "Tickets cancelled"
        );

        Ok(CancellationReceipt {
            cancellation_id: receipt_id,
            refund_amount,
            refund_status,
            new_booking_status: updated.status,
            active_tickets: updated.tickets.quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{
        Booking, BookingConfirmation, ChargeRule, ChargeType, ConfirmationSource, Tickets,
    };
    use crate::store::InMemoryStore;

    async fn confirmed_booking(store: &InMemoryStore, quantity: i32, price: Decimal) -> Booking {
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            booking_code: format!("BKNG_{}_abc123", now.timestamp_millis()),
            user_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            tickets: Tickets {
                original_quantity: quantity,
                quantity,
                price_per_ticket: price,
                subtotal: price * Decimal::from(quantity),
            },
            charges: BTreeMap::new(),
            total_amount: price * Decimal::from(quantity),
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
        };
        store.insert_booking(booking.clone()).await.unwrap();
        store
            .confirm_booking(
                booking.id,
                BookingConfirmation {
                    qr_code_url: "https://cdn.test/qr.svg".into(),
                    payment_reference: "pay_1".into(),
                    gateway_order_id: None,
                    amount_paid: None,
                    source: ConfirmationSource::Client,
                    confirmed_at: now,
                },
            )
            .await
            .unwrap()
            .unwrap()
    }

    fn ledger(store: &Arc<InMemoryStore>) -> CancellationLedger {
        CancellationLedger::new(store.clone(), Arc::new(KeyedLocks::new()), "cancellation_fee")
    }

    fn request(booking: &Booking, count: i32) -> CancelRequest {
        CancelRequest {
            user_id: booking.user_id,
            booking_id: booking.id,
            number_of_tickets_to_cancel: Some(count),
            reason: Some("Plans changed".into()),
        }
    }

    #[tokio::test]
    async fn over_cancellation_is_rejected() {
        let store = Arc::new(InMemoryStore::default());
        let booking = confirmed_booking(&store, 2, dec!(500)).await;
        let ledger = ledger(&store);

        let receipt = ledger.cancel_tickets(request(&booking, 1)).await.unwrap();
        assert_eq!(receipt.new_booking_status, BookingStatus::PartiallyCancelled);
        assert_eq!(receipt.active_tickets, 1);

        let err = ledger.cancel_tickets(request(&booking, 2)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.tickets.quantity, 1);
        assert_eq!(store.cancellations(booking.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_and_active_count_always_add_up() {
        let store = Arc::new(InMemoryStore::default());
        let booking = confirmed_booking(&store, 6, dec!(250)).await;
        let ledger = ledger(&store);

        for count in [2, 1, 3] {
            ledger.cancel_tickets(request(&booking, count)).await.unwrap();

            let stored = store.get_booking(booking.id).await.unwrap().unwrap();
            let entries = store.cancellations(booking.id).await.unwrap();
            assert_eq!(
                tickets_cancelled(&entries) + stored.tickets.quantity,
                stored.tickets.original_quantity
            );
        }

        let stored = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert_eq!(stored.tickets.quantity, 0);

        let err = ledger.cancel_tickets(request(&booking, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_cancellations_never_oversell() {
        let store = Arc::new(InMemoryStore::default());
        let booking = confirmed_booking(&store, 3, dec!(100)).await;
        let ledger = Arc::new(ledger(&store));

        let attempts: Vec<_> = (0..6)
            .map(|_| {
                let ledger = ledger.clone();
                let request = request(&booking, 1);
                tokio::spawn(async move { ledger.cancel_tickets(request).await })
            })
            .collect();

        let mut succeeded = 0;
        for attempt in attempts {
            if attempt.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 3);

        let entries = store.cancellations(booking.id).await.unwrap();
        assert_eq!(tickets_cancelled(&entries), 3);
    }

    #[tokio::test]
    async fn refund_deducts_the_cancellation_fee() {
        let store = Arc::new(InMemoryStore::default());
        store
            .insert_charge_rule(ChargeRule::new(
                "cancellation_fee",
                ChargeType::Percentage,
                dec!(10),
            ))
            .await;
        let booking = confirmed_booking(&store, 2, dec!(500)).await;

        let receipt = ledger(&store)
            .cancel_tickets(request(&booking, 1))
            .await
            .unwrap();

        assert_eq!(receipt.refund_amount, dec!(450));
        assert_eq!(receipt.refund_status, RefundStatus::Pending);
    }

    #[tokio::test]
    async fn fee_larger_than_refund_means_nothing_to_refund() {
        let store = Arc::new(InMemoryStore::default());
        store
            .insert_charge_rule(ChargeRule::new(
                "cancellation_fee",
                ChargeType::Fixed,
                dec!(800),
            ))
            .await;
        let booking = confirmed_booking(&store, 1, dec!(500)).await;

        let receipt = ledger(&store)
            .cancel_tickets(request(&booking, 1))
            .await
            .unwrap();

        assert_eq!(receipt.refund_amount, Decimal::ZERO);
        assert_eq!(receipt.refund_status, RefundStatus::NotApplicable);
        assert_eq!(receipt.new_booking_status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn only_the_owner_of_a_confirmed_booking_can_cancel() {
        let store = Arc::new(InMemoryStore::default());
        let booking = confirmed_booking(&store, 2, dec!(500)).await;
        let ledger = ledger(&store);

        let mut stranger = request(&booking, 1);
        stranger.user_id = Uuid::new_v4();
        assert!(matches!(
            ledger.cancel_tickets(stranger).await,
            Err(AppError::Forbidden(_))
        ));

        let mut no_reason = request(&booking, 1);
        no_reason.reason = Some("   ".into());
        assert!(matches!(
            ledger.cancel_tickets(no_reason).await,
            Err(AppError::ValidationError(_))
        ));

        let mut zero = request(&booking, 0);
        zero.number_of_tickets_to_cancel = Some(0);
        assert!(matches!(
            ledger.cancel_tickets(zero).await,
            Err(AppError::ValidationError(_))
        ));

        assert_eq!(store.cancellations(booking.id).await.unwrap().len(), 0);
    }
}
