//! Core data models for the video-sharing backend.
//!
//! Row types map to SQLite tables via `sqlx::FromRow`; the `*Response`
//! structs are the statically defined shapes returned over HTTP.

pub mod comment;
pub mod follow;
pub mod page;
pub mod video;
