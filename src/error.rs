//! Crate error type.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::core::FormatError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The remote endpoint is already engaged in another transfer.
    #[error("remote endpoint {0} is already in use by another transfer")]
    AddressInUse(SocketAddr),

    /// No matching response arrived before the deadline.
    #[error("a response was not received after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation fired. Distinct from [`Error::Timeout`].
    #[error("the operation was cancelled")]
    Cancelled,

    /// A default-destination send was attempted before `connect`.
    #[error("destination address required: the connection has no peer")]
    AddressRequired,

    /// The connection's receive loop has stopped.
    #[error("connection closed")]
    Closed,

    /// A matched packet had an unexpected shape. Receive filters make
    /// this unreachable in practice.
    #[error("protocol violation: expected {expected}, received {received}")]
    Protocol {
        expected: &'static str,
        received: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
