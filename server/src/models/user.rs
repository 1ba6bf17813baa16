use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const ACTIVE_STATUS: &str = "active";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == ACTIVE_STATUS
    }
}

/// User contact fields exposed alongside booking responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContact {
    pub user_id: Uuid,
    pub user_full_name: String,
    pub user_email: String,
    pub user_phone: Option<String>,
}

impl From<&User> for UserContact {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            user_full_name: user.full_name.clone(),
            user_email: user.email.clone(),
            user_phone: user.phone.clone(),
        }
    }
}
