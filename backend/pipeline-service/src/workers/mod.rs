//! Queue consumers.
//!
//! One handler per queue. Handlers must tolerate redelivery: every
//! persistence call is idempotent (conflict means an earlier attempt
//! already landed) and side effects after a duplicate insert are
//! skipped. Persistence errors propagate as retryable; validation and
//! ownership failures complete as logged no-ops; cache and broadcast
//! failures degrade to warnings since TTLs repair them.

mod comment;
mod like;
mod message;
mod post;
mod seen;

pub use comment::CommentWorker;
pub use like::LikeWorker;
pub use message::MessageWorker;
pub use post::PostWorker;
pub use seen::SeenWorker;
