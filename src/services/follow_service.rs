//! Follow relations. Users are identified by the id the gateway forwards;
//! there is no local users table to check them against.

use crate::models::{
    follow::UserFollowing,
    page::{Page, PageParams},
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("You are already subscribed to the user")]
    AlreadyFollowing,
    #[error("You cannot subscribe to yourself")]
    SelfFollow,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type FollowResult<T> = Result<T, FollowError>;

#[derive(Clone)]
pub struct FollowService {
    pub db: Arc<SqlitePool>,
}

impl FollowService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Record that `user_id` follows `target`. Following twice is an error.
    pub async fn follow(&self, user_id: Uuid, target: Uuid) -> FollowResult<UserFollowing> {
        if user_id == target {
            return Err(FollowError::SelfFollow);
        }

        let created = sqlx::query_as::<_, UserFollowing>(
            "INSERT INTO user_followings (user_id, following_user_id, created)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id, following_user_id) DO NOTHING
             RETURNING user_id, following_user_id, created",
        )
        .bind(user_id)
        .bind(target)
        .bind(Utc::now())
        .fetch_optional(&*self.db)
        .await?;

        let follow = created.ok_or(FollowError::AlreadyFollowing)?;
        debug!(user_id = %user_id, target = %target, "follow recorded");
        Ok(follow)
    }

    /// Remove the relation if present. Returns whether anything was removed.
    pub async fn unfollow(&self, user_id: Uuid, target: Uuid) -> FollowResult<bool> {
        let result = sqlx::query(
            "DELETE FROM user_followings WHERE user_id = ? AND following_user_id = ?",
        )
        .bind(user_id)
        .bind(target)
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Users `user_id` follows, most recent first.
    pub async fn followings(
        &self,
        user_id: Uuid,
        params: PageParams,
    ) -> FollowResult<Page<UserFollowing>> {
        self.page("user_id", user_id, params).await
    }

    /// Users following `user_id`, most recent first.
    pub async fn followers(
        &self,
        user_id: Uuid,
        params: PageParams,
    ) -> FollowResult<Page<UserFollowing>> {
        self.page("following_user_id", user_id, params).await
    }

    async fn page(
        &self,
        column: &'static str,
        user_id: Uuid,
        params: PageParams,
    ) -> FollowResult<Page<UserFollowing>> {
        let count = format!("SELECT COUNT(*) FROM user_followings WHERE {} = ?", column);
        let total: i64 = sqlx::query_scalar(&count)
            .bind(user_id)
            .fetch_one(&*self.db)
            .await?;

        let select = format!(
            "SELECT user_id, following_user_id, created FROM user_followings
             WHERE {} = ?
             ORDER BY created DESC, id DESC LIMIT ? OFFSET ?",
            column
        );
        let items = sqlx::query_as::<_, UserFollowing>(&select)
            .bind(user_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&*self.db)
            .await?;

        Ok(Page::new(items, total, params))
    }
}
