use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::booking::{BookingService, PaymentDetails};
use crate::gateway::WebhookVerifier;
use crate::models::ConfirmationSource;
use crate::utils::{AppError, AppResult};

pub const PAYMENT_CAPTURED: &str = "payment.captured";

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<EntityWrapper>,
}

#[derive(Debug, Deserialize)]
struct EntityWrapper {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    /// Minor units.
    amount: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    #[serde(rename_all = "camelCase")]
    Confirmed {
        booking_id: Uuid,
        newly_confirmed: bool,
    },
    Ignored {
        event: String,
    },
    /// Acknowledged so the gateway stops redelivering; nothing was changed.
    #[serde(rename_all = "camelCase")]
    UnknownOrder {
        order_id: String,
    },
}

/// Gateway-initiated confirmation. Trusts nothing in the body until its
/// signature checks out against the webhook secret.
pub struct PaymentWebhooks {
    verifier: WebhookVerifier,
    bookings: Arc<BookingService>,
}

impl PaymentWebhooks {
    pub fn new(verifier: WebhookVerifier, bookings: Arc<BookingService>) -> Self {
        Self { verifier, bookings }
    }

    pub async fn process(&self, body: &[u8], signature: Option<&str>) -> AppResult<WebhookOutcome> {
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::AuthError("Missing webhook signature".to_string()))?;
        if !self.verifier.verify(body, signature) {
            warn!("Rejected webhook with an invalid signature");
            return Err(AppError::AuthError("Invalid webhook signature".to_string()));
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| AppError::ValidationError(format!("Malformed webhook body: {}", e)))?;

        if envelope.event != PAYMENT_CAPTURED {
            info!(event = %envelope.event, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored {
                event: envelope.event,
            });
        }

        let payment = envelope
            .payload
            .and_then(|p| p.payment)
            .map(|w| w.entity)
            .ok_or_else(|| {
                AppError::ValidationError("payment.captured without a payment entity".to_string())
            })?;
        let order_id = payment.order_id.ok_or_else(|| {
            AppError::ValidationError("Captured payment has no order id".to_string())
        })?;

        let booking = match self.bookings.booking_for_order(&order_id).await {
            Ok(booking) => booking,
            Err(AppError::NotFound(_)) => {
                warn!(
                    order_id = %order_id,
                    payment_id = %payment.id,
                    "Captured payment for an unknown order"
                );
                return Ok(WebhookOutcome::UnknownOrder { order_id });
            }
            Err(e) => return Err(e),
        };
        let outcome = self
            .bookings
            .confirm(
                booking.id,
                PaymentDetails {
                    payment_reference: payment.id,
                    gateway_order_id: Some(order_id),
                    amount_paid: Some(Decimal::new(payment.amount, 2)),
                    source: ConfirmationSource::Webhook,
                },
            )
            .await?;

        Ok(WebhookOutcome::Confirmed {
            booking_id: outcome.booking.id,
            newly_confirmed: outcome.newly_confirmed,
        })
    }
}
