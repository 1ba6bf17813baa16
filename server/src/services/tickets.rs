use std::sync::Arc;

use chrono::{DateTime, Utc};
use qrcode::render::svg;
use qrcode::QrCode;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::gateway::BlobStore;
use crate::models::{Booking, Tickets};
use crate::utils::{AppError, AppResult};

const QR_PREFIX: &str = "qrcodes";
const SVG_CONTENT_TYPE: &str = "image/svg+xml";

/// Content encoded in a ticket's QR code.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload<'a> {
    pub booking_code: &'a str,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub tickets: &'a Tickets,
    pub total_amount: Decimal,
}

impl<'a> From<&'a Booking> for QrPayload<'a> {
    fn from(booking: &'a Booking) -> Self {
        Self {
            booking_code: &booking.booking_code,
            event_id: booking.event_id,
            user_id: booking.user_id,
            tickets: &booking.tickets,
            total_amount: booking.total_amount,
        }
    }
}

/// Storage key of a QR image. The timestamp keeps retries from overwriting
/// an object another confirmation attempt may already reference.
pub fn qr_object_key(booking_code: &str, at: DateTime<Utc>) -> String {
    format!("{}/{}_{}.svg", QR_PREFIX, booking_code, at.timestamp_millis())
}

pub fn render_qr_svg(content: &[u8]) -> AppResult<String> {
    let code = QrCode::new(content)
        .map_err(|e| AppError::InternalServerError(format!("QR encoding failed: {}", e)))?;

    Ok(code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build())
}

/// Renders a booking's QR code and uploads it to the blob store.
pub struct TicketIssuer {
    blobs: Arc<dyn BlobStore>,
}

impl TicketIssuer {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Returns the public URL of a freshly stored QR image. Every call stores
    /// a new object.
    pub async fn issue(&self, booking: &Booking) -> AppResult<String> {
        let payload = serde_json::to_vec(&QrPayload::from(booking))
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        let svg = render_qr_svg(&payload)?;

        let key = qr_object_key(&booking.booking_code, Utc::now());
        let url = self
            .blobs
            .put(&key, svg.into_bytes(), SVG_CONTENT_TYPE)
            .await?;

        info!(booking_code = %booking.booking_code, %key, "Issued ticket QR code");
        Ok(url)
    }
}
