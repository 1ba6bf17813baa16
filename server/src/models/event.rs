use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Event as read by the booking and notification flows. Owned by the event
/// catalogue; this service never writes it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub venue: String,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub time_from: Option<String>,
    pub time_to: Option<String>,
    pub ticket_price: Decimal,
    pub banner_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Event fields exposed alongside booking responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    pub event_id: Uuid,
    pub event_name: String,
    pub event_date_from: Option<NaiveDate>,
    pub event_date_to: Option<NaiveDate>,
    pub event_time_from: Option<String>,
    pub event_time_to: Option<String>,
    pub event_venue: String,
    pub banner_url: Option<String>,
}

impl From<&Event> for EventMeta {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id,
            event_name: event.title.clone(),
            event_date_from: event.date_from,
            event_date_to: event.date_to,
            event_time_from: event.time_from.clone(),
            event_time_to: event.time_to.clone(),
            event_venue: event.venue.clone(),
            banner_url: event.banner_url.clone(),
        }
    }
}
