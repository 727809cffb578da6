//! Request-path services.
//!
//! Validation and reads happen synchronously here; writes are enqueued
//! and land through the workers. Validation failures surface before the
//! enqueue, so a fire-and-forget job has already passed the checks a
//! user could get feedback on.

mod follow;
mod message;
mod post;

pub use follow::FollowService;
pub use message::MessageService;
pub use post::PostService;
