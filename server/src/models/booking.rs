use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a booking. Transitions only ever move forward:
/// `pending -> confirmed -> partially_cancelled -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    PartiallyCancelled,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::PartiallyCancelled => "partially_cancelled",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Payment has been captured for this booking at some point.
    pub fn is_paid(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }

    /// Tickets can still be cancelled against this booking.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            BookingStatus::Confirmed | BookingStatus::PartiallyCancelled
        )
    }

    /// Status after cancellations leave `active` tickets on the booking.
    pub fn after_cancellation(active: i32) -> Self {
        if active == 0 {
            BookingStatus::Cancelled
        } else {
            BookingStatus::PartiallyCancelled
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "partially_cancelled" => Ok(BookingStatus::PartiallyCancelled),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    Client,
    Webhook,
}

impl ConfirmationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationSource::Client => "client",
            ConfirmationSource::Webhook => "webhook",
        }
    }
}

impl FromStr for ConfirmationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(ConfirmationSource::Client),
            "webhook" => Ok(ConfirmationSource::Webhook),
            other => Err(format!("unknown confirmation source '{}'", other)),
        }
    }
}

/// Ticket block of a booking.
///
/// `original_quantity` is fixed at creation; `quantity` is the active count and
/// only ever decreases as cancellations are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tickets {
    pub original_quantity: i32,
    pub quantity: i32,
    pub price_per_ticket: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub booking_code: String,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub tickets: Tickets,
    /// Charge amounts snapshotted at booking time.
    pub charges: BTreeMap<String, Decimal>,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub booking_date: NaiveDate,
    pub qr_code_url: Option<String>,
    pub payment_reference: Option<String>,
    pub gateway_order_id: Option<String>,
    pub amount_paid: Option<Decimal>,
    pub confirmed_via: Option<ConfirmationSource>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the store needs to flip a pending booking to confirmed.
#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    pub qr_code_url: String,
    pub payment_reference: String,
    pub gateway_order_id: Option<String>,
    pub amount_paid: Option<Decimal>,
    pub source: ConfirmationSource,
    pub confirmed_at: DateTime<Utc>,
}

/// Generates a human readable booking code: `BKNG_<unix-millis>_<6 hex chars>`.
pub fn generate_booking_code(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("BKNG_{}_{}", now.timestamp_millis(), &suffix[..6])
}
