//! Session-level error taxonomy for the replay harness.
//!
//! Errors are ordered by the stage at which they can occur:
//!
//! - [`ReplayError::MissingInput`]: descriptor intake, before anything
//!   else runs
//! - [`ReplayError::IncompleteInput`]: input materialization, before the
//!   mock service starts
//! - [`ReplayError::RpcTransport`]: endpoint binding or worker
//!   invocation; never prevents service teardown
//! - [`ReplayError::DuplicateResultId`]: identifier generation defect;
//!   unreachable unless fresh-identifier generation is broken

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while driving one replay session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReplayError {
    /// The task descriptor source is unavailable or unreadable.
    ///
    /// Fatal; detected before the mock service starts.
    #[error("task descriptor unavailable at {path}: {reason}")]
    MissingInput {
        /// Path that was expected to hold the descriptor dump.
        path: PathBuf,
        /// Why the descriptor could not be obtained.
        reason: String,
    },

    /// A referenced identifier has neither inline bytes nor a staged
    /// file.
    ///
    /// Fatal; detected before the worker is invoked, so no side effect
    /// has occurred yet.
    #[error("no resolvable data for identifier {id} (no inline bytes, no file under {folder})")]
    IncompleteInput {
        /// The data-dependency or output identifier that failed to
        /// resolve.
        id: String,
        /// The data folder that was searched for a staged file.
        folder: PathBuf,
    },

    /// The local endpoint could not be bound, or the worker invocation
    /// failed at the transport or protocol level.
    ///
    /// Fatal for the current session, but teardown still runs and
    /// whatever was recorded before the failure remains available.
    #[error("transport failure during {stage}: {reason}")]
    RpcTransport {
        /// The stage that failed (`"bind"` or `"worker"`).
        stage: &'static str,
        /// Transport-level failure description.
        reason: String,
    },

    /// A freshly generated result identifier collided with an existing
    /// one.
    ///
    /// Identifiers are random UUIDs; a collision indicates an
    /// identifier-generation defect and is surfaced loudly rather than
    /// silently ignored.
    #[error("duplicate result identifier generated: {id}")]
    DuplicateResultId {
        /// The colliding identifier.
        id: String,
    },
}

impl ReplayError {
    /// Builds a transport error for the given stage.
    #[must_use]
    pub fn transport(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::RpcTransport {
            stage,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error occurred before any side effect, so
    /// the session left no partial state behind.
    #[must_use]
    pub const fn is_pre_flight(&self) -> bool {
        matches!(
            self,
            Self::MissingInput { .. } | Self::IncompleteInput { .. }
        )
    }
}
