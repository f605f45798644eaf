//! Caller identity.
//!
//! Token verification happens upstream; the gateway forwards the
//! authenticated user id in the `x-user-id` header.

use crate::errors::AppError;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Could not validate credentials"))?;

        Uuid::parse_str(raw.trim())
            .map(CurrentUser)
            .map_err(|_| AppError::unauthorized("Could not validate credentials"))
    }
}
