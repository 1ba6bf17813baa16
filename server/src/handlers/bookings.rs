use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Booking, BookingStatus};
use crate::services::booking::{
    ConfirmOutcome, InitiateBookingRequest, PaymentDetails, SummaryRequest,
};
use crate::services::cancellation::CancelRequest;
use crate::services::payments::WebhookOutcome;
use crate::state::AppState;
use crate::utils::response::{created, success};
use crate::utils::{AppJson, AppResult};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRef {
    pub booking_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedBookingRef {
    pub user_id: Uuid,
    pub booking_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub booking_id: Uuid,
    #[serde(default)]
    pub payment_reference: String,
}

/// What the client needs after a confirmation attempt.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmationView {
    booking_id: Uuid,
    booking_code: String,
    status: BookingStatus,
    qr_code_url: Option<String>,
    newly_confirmed: bool,
}

impl From<ConfirmOutcome> for ConfirmationView {
    fn from(outcome: ConfirmOutcome) -> Self {
        let Booking {
            id,
            booking_code,
            status,
            qr_code_url,
            ..
        } = outcome.booking;
        Self {
            booking_id: id,
            booking_code,
            status,
            qr_code_url,
            newly_confirmed: outcome.newly_confirmed,
        }
    }
}

pub async fn get_booking_summary(
    State(state): State<AppState>,
    AppJson(request): AppJson<SummaryRequest>,
) -> AppResult<Response> {
    let summary = state.bookings.summary(request).await?;
    Ok(success(summary, "Booking summary generated"))
}

pub async fn initiate_booking(
    State(state): State<AppState>,
    AppJson(request): AppJson<InitiateBookingRequest>,
) -> AppResult<Response> {
    let booking = state.bookings.initiate(request).await?;
    Ok(created(booking, "Booking initiated"))
}

pub async fn create_order(
    State(state): State<AppState>,
    AppJson(request): AppJson<BookingRef>,
) -> AppResult<Response> {
    let order = state.bookings.create_payment_order(request.booking_id).await?;
    Ok(success(order, "Payment order created"))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    AppJson(request): AppJson<VerifyPaymentRequest>,
) -> AppResult<Response> {
    let outcome = state
        .bookings
        .verify_payment(&request.order_id, &request.payment_id, &request.signature)
        .await?;
    Ok(success(
        ConfirmationView::from(outcome),
        "Payment verified and booking confirmed",
    ))
}

pub async fn finalize_booking(
    State(state): State<AppState>,
    AppJson(request): AppJson<FinalizeRequest>,
) -> AppResult<Response> {
    let outcome = state
        .bookings
        .confirm(
            request.booking_id,
            PaymentDetails::from_client(request.payment_reference),
        )
        .await?;
    Ok(success(ConfirmationView::from(outcome), "Booking confirmed"))
}

/// Gateway callback. The signature covers the raw body, so it is read as bytes.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let outcome = state.webhooks.process(&body, signature).await?;

    let message = match &outcome {
        WebhookOutcome::Confirmed { .. } => "Payment captured",
        WebhookOutcome::Ignored { .. } => "Event ignored",
        WebhookOutcome::UnknownOrder { .. } => "No booking for this order",
    };
    Ok(success(outcome, message))
}

pub async fn confirm_booked_summary(
    State(state): State<AppState>,
    AppJson(request): AppJson<BookingRef>,
) -> AppResult<Response> {
    let summary = state.bookings.confirmed_summary(request.booking_id).await?;
    Ok(success(summary, "Booking details fetched"))
}

pub async fn my_bookings(
    State(state): State<AppState>,
    AppJson(request): AppJson<UserRef>,
) -> AppResult<Response> {
    let bookings = state.bookings.my_bookings(request.user_id).await?;
    Ok(success(bookings, "Bookings fetched"))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    AppJson(request): AppJson<CancelRequest>,
) -> AppResult<Response> {
    let receipt = state.cancellations.cancel_tickets(request).await?;
    Ok(success(receipt, "Tickets cancelled"))
}

pub async fn cancellations(
    State(state): State<AppState>,
    AppJson(request): AppJson<OwnedBookingRef>,
) -> AppResult<Response> {
    let entries = state
        .bookings
        .list_cancellations(request.booking_id, request.user_id)
        .await?;
    Ok(success(entries, "Cancellations fetched"))
}
