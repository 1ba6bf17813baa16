use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    )),
                }
            }
        }
    };
}

text_enum!(BroadcastType {
    EventCreate => "event_create",
    EventUpdate => "event_update",
    Promotion => "promotion",
    SystemAnnouncement => "system_announcement",
});

text_enum!(DeliveryStatus {
    Pending => "pending",
    Sending => "sending",
    Sent => "sent",
    Failed => "failed",
    Read => "read",
});

text_enum!(NotificationKind {
    Reminder => "reminder",
    Promotion => "promotion",
    SystemAlert => "system_alert",
    Trending => "trending",
});

text_enum!(Priority {
    High => "high",
    Medium => "medium",
    Low => "low",
});

text_enum!(NotificationSource {
    System => "system",
    Admin => "admin",
    User => "user",
});

/// One logical broadcast. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterNotification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: BroadcastType,
    pub event_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub deep_link: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMasterNotification {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: BroadcastType,
    pub event_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub deep_link: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl NewMasterNotification {
    pub fn into_master(self, now: DateTime<Utc>) -> MasterNotification {
        MasterNotification {
            id: Uuid::new_v4(),
            title: self.title,
            message: self.message,
            kind: self.kind,
            event_id: self.event_id,
            image_url: self.image_url,
            deep_link: self.deep_link,
            metadata: if self.metadata.is_null() {
                Value::Object(Default::default())
            } else {
                self.metadata
            },
            created_at: now,
        }
    }
}

/// Per-recipient delivery record of a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_id: Uuid,
    pub status: DeliveryStatus,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserNotification {
    pub fn pending(user_id: Uuid, notification_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            notification_id,
            status: DeliveryStatus::Pending,
            is_read: false,
            read_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A per-user record joined with the broadcast it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    #[serde(flatten)]
    pub record: UserNotification,
    pub notification: MasterNotification,
}

/// Single-recipient notification. The record is the audit trail; it survives
/// delivery failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub priority: Priority,
    pub image_url: Option<String>,
    pub deep_link: Option<String>,
    pub status: DeliveryStatus,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub source: NotificationSource,
    pub metadata: Value,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: Uuid,
    pub event_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub image_url: Option<String>,
    pub deep_link: Option<String>,
    #[serde(default = "default_source")]
    pub source: NotificationSource,
    #[serde(default)]
    pub metadata: Value,
}

fn default_priority() -> Priority {
    Priority::Medium
}

fn default_source() -> NotificationSource {
    NotificationSource::System
}

impl NewNotification {
    pub fn into_pending(self, now: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            event_id: self.event_id,
            title: self.title,
            body: self.body,
            kind: self.kind,
            priority: self.priority,
            image_url: self.image_url,
            deep_link: self.deep_link,
            status: DeliveryStatus::Pending,
            is_read: false,
            read_at: None,
            source: self.source,
            metadata: if self.metadata.is_null() {
                Value::Object(Default::default())
            } else {
                self.metadata
            },
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_use_wire_names() {
        assert_eq!(BroadcastType::EventCreate.as_str(), "event_create");
        assert_eq!("system_alert".parse(), Ok(NotificationKind::SystemAlert));
        assert_eq!(
            serde_json::to_value(DeliveryStatus::Read).unwrap(),
            serde_json::json!("read")
        );
        assert!("delivered".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn new_master_defaults_metadata_to_an_object() {
        let new: NewMasterNotification = serde_json::from_value(serde_json::json!({
            "title": "Jazz Night",
            "message": "Just announced",
            "type": "event_create"
        }))
        .unwrap();

        let master = new.into_master(Utc::now());
        assert!(master.metadata.is_object());
        assert_eq!(master.kind, BroadcastType::EventCreate);
    }
}
