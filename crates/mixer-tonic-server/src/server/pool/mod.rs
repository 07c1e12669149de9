//! Bounded-concurrency execution shared by every stream.
//!
//! A fixed set of worker tasks drains one unbounded queue. Streams enqueue
//! as fast as they decode, while at most `num_workers` requests execute at
//! any moment server-wide.

mod manager;
mod request;
mod worker;

pub use manager::WorkerPool;
pub use request::{WorkItem, WorkRequest};
