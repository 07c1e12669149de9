//! Error types for the attribute exchange service.
//!
//! This module defines the central `Error` enum, which captures every
//! recoverable and reportable failure in the protocol core. Two conversions
//! map it onto the wire:
//!
//! - `From<Error> for tonic::Status` for failures that end a whole stream.
//! - `From<&Error> for RpcStatus` for failures scoped to one request, which
//!   are reported in that request's response while the stream carries on.
//!
//! ## Error Cases
//! - `InvalidAttributeIndex`: A dictionary index in an attribute update does
//!   not resolve.
//! - `InvalidAttributeValue`: A timestamp or duration is out of range.
//! - `ConflictingDelta`: One update names the same attribute twice.
//! - `Bag`: A bag operation failed (e.g. a merge conflict).
//! - `Executor`: The per-request executor failed.
//! - `ChannelError`: An internal communication failure between tasks.
//! - `Transport`: Reading from or writing to the stream failed.
//! - `ServiceShutdown`: Work arrived while the service was shutting down.

use crate::proto::RpcStatus;
use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the attribute exchange service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// A name, string value or string-map entry index is out of range.
    #[error("invalid attribute index {index}")]
    InvalidAttributeIndex { index: i32 },

    /// An attribute value cannot be represented (e.g. a negative duration).
    #[error("invalid value for attribute {name}: {reason}")]
    InvalidAttributeValue { name: String, reason: String },

    /// A single update sets, or sets and deletes, the same attribute more
    /// than once.
    #[error("attribute {name} appears more than once in one update")]
    ConflictingDelta { name: String },

    /// A bag operation failed.
    #[error(transparent)]
    Bag(#[from] mixer::Error),

    /// The executor handling a request failed.
    #[error("executor error: {0}")]
    Executor(String),

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The underlying stream failed.
    #[error("transport error ({code:?}): {message}")]
    Transport { code: Code, message: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// The canonical status code this error maps to.
    pub const fn code(&self) -> Code {
        match self {
            Self::InvalidAttributeIndex { .. }
            | Self::InvalidAttributeValue { .. }
            | Self::ConflictingDelta { .. } => Code::InvalidArgument,
            Self::Bag(_) | Self::Executor(_) | Self::ChannelError { .. } => Code::Internal,
            Self::Transport { code, .. } => *code,
            Self::ServiceShutdown => Code::Unavailable,
        }
    }

    /// Returns `true` for errors caused by a malformed attribute update.
    pub const fn is_invalid_update(&self) -> bool {
        matches!(self.code(), Code::InvalidArgument)
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::Transport {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::Transport { code, message } => Status::new(code, message),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
            other => Status::new(other.code(), other.to_string()),
        }
    }
}

impl From<&Error> for RpcStatus {
    fn from(err: &Error) -> Self {
        let message = if err.is_invalid_update() {
            format!("Request could not be processed due to invalid 'attribute_update': {err}")
        } else {
            err.to_string()
        };
        Self::new(err.code(), message)
    }
}
