//! Per-stream request handling.
//!
//! - [`coordinator`] - the read loop: decode, schedule, drain
//!   ([`StreamDispatcher`](coordinator::StreamDispatcher)).
//! - [`processor`] - the work item each request becomes: execute, encode,
//!   respond.

pub mod coordinator;
pub mod processor;
