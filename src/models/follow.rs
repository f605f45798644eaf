//! Follow relations between users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// `user_id` follows `following_user_id`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UserFollowing {
    pub user_id: Uuid,
    pub following_user_id: Uuid,
    pub created: DateTime<Utc>,
}
