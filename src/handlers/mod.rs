pub mod comment_handlers;
pub mod health_handlers;
pub mod identity;
pub mod user_handlers;
pub mod video_handlers;
