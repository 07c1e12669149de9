//! gRPC service implementation.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`MixerService`).
//! - [`executor`] - the per-method business logic seam and its default
//!   implementation.

pub mod executor;
pub mod handler;
