//! Attribute deltas on the wire.
//!
//! [`decode`] and [`encode`] translate single messages; [`Tracker`] keeps the
//! per-stream state that turns a sequence of deltas into full attribute
//! sets, and full response bags back into deltas.

mod codec;
mod tracker;

pub use codec::{decode, encode};
pub use tracker::Tracker;
