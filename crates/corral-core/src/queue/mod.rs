//! Queue module: pending-task ordering and retry backoff policy.

mod priority;
mod retry;

pub use priority::PriorityQueue;
pub use retry::{Jitter, RetryPolicy};
