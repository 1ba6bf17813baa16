use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundStatus {
    #[serde(rename = "Not Applicable")]
    NotApplicable,
    Pending,
    Processed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::NotApplicable => "Not Applicable",
            RefundStatus::Pending => "Pending",
            RefundStatus::Processed => "Processed",
            RefundStatus::Failed => "Failed",
        }
    }

    pub fn for_amount(refund_amount: Decimal) -> Self {
        if refund_amount > Decimal::ZERO {
            RefundStatus::Pending
        } else {
            RefundStatus::NotApplicable
        }
    }
}

impl FromStr for RefundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Not Applicable" => Ok(RefundStatus::NotApplicable),
            "Pending" => Ok(RefundStatus::Pending),
            "Processed" => Ok(RefundStatus::Processed),
            "Failed" => Ok(RefundStatus::Failed),
            other => Err(format!("unknown refund status '{}'", other)),
        }
    }
}

/// One immutable entry in a booking's cancellation ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub cancelled_by: Uuid,
    pub number_of_tickets_cancelled: i32,
    pub reason: String,
    pub refund_amount: Decimal,
    pub refund_status: RefundStatus,
    pub cancelled_at: DateTime<Utc>,
}

/// Sum of tickets cancelled across a ledger.
pub fn tickets_cancelled(ledger: &[Cancellation]) -> i32 {
    ledger.iter().map(|c| c.number_of_tickets_cancelled).sum()
}

/// Booking-side half of an atomic cancellation write.
///
/// The store applies it only if the booking's active count still equals
/// `expected_active`.
#[derive(Debug, Clone, Copy)]
pub struct ActiveTicketsUpdate {
    pub expected_active: i32,
    pub new_active: i32,
    pub new_status: super::booking::BookingStatus,
}
