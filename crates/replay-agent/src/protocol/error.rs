//! Protocol error types for the UDS transport layer.
//!
//! These cover framing, encoding, and connection lifecycle failures on
//! the loopback-only sockets the harness uses. Anything above the
//! transport (a worker that fails while processing, a bind failure seen
//! by the orchestrator) is mapped into the session-level
//! [`ReplayError`](replay_core::ReplayError) taxonomy at the harness
//! boundary.

use std::io;

use thiserror::Error;

/// Maximum frame size in bytes (16 MiB).
///
/// Frames are capped to prevent memory exhaustion; the cap is checked
/// against the length prefix before any allocation happens.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Errors on the UDS protocol layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Frame exceeds [`MAX_FRAME_SIZE`], detected before allocation.
    #[error("frame too large: {size} bytes exceeds maximum {max} bytes")]
    FrameTooLarge {
        /// Size announced by the length prefix.
        size: usize,
        /// Maximum allowed frame size.
        max: usize,
    },

    /// Frame structure does not match the expected format.
    #[error("invalid frame: {reason}")]
    InvalidFrame {
        /// Description of the framing error.
        reason: String,
    },

    /// A protobuf payload failed to decode.
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The peer closed the connection before the exchange completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer replied with an error envelope.
    #[error("peer error: {message}")]
    Peer {
        /// Message carried in the error envelope.
        message: String,
    },

    /// Underlying I/O error from the transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Builds an invalid-frame error.
    #[must_use]
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    /// Builds a peer-error from an error envelope message.
    #[must_use]
    pub fn peer(message: impl Into<String>) -> Self {
        Self::Peer {
            message: message.into(),
        }
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
