#![doc = include_str!("../README.md")]

pub mod attribute;
mod common;
pub use common::*;
// Public re-export so downstream crates can access `mixer` via
// `mixer_tonic_core::mixer`
pub use mixer;

/// Generated message types, client and server for `mixer.v1`.
pub mod proto {
    tonic::include_proto!("mixer.v1");

    /// Encoded descriptor set for gRPC reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("mixer_descriptor");
}
