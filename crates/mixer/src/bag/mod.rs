//! Hierarchical attribute bags.
//!
//! A bag maps attribute names to typed [`Value`]s. Bags form a tree: every
//! [`MutableBag`] has exactly one parent, and lookups that miss locally fall
//! through to it. A name deleted in a layer shadows any value its ancestors
//! hold.
//!
//! ## Types
//!
//! - [`Bag`] - The read contract shared by every bag.
//! - [`EmptyBag`] - The terminal parent; holds nothing.
//! - [`ProtoBag`] - An immutable bag, usually decoded from one wire message.
//! - [`MutableBag`] - A writable layer with child scoping, merge and an
//!   explicit release (`done`).

mod mutable;
mod proto;

pub use mutable::*;
pub use proto::*;

use crate::value::Value;

/// Read access to a set of named attributes.
///
/// Implementations must be cheap to query concurrently; a request bag is read
/// by a worker task while the connection that produced it keeps decoding.
pub trait Bag: Send + Sync {
    /// Looks up an attribute, returning `None` if it is absent or deleted.
    fn get(&self, name: &str) -> Option<Value>;

    /// Every visible attribute name. Iteration order is unspecified.
    fn names(&self) -> Vec<String>;
}

/// A bag with no attributes.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyBag;

impl Bag for EmptyBag {
    fn get(&self, _name: &str) -> Option<Value> {
        None
    }

    fn names(&self) -> Vec<String> {
        Vec::new()
    }
}
