//! replay-core - Domain model for local task replay.
//!
//! This crate holds the data model shared by the replay harness and its
//! CLI front end:
//!
//! - [`descriptor`]: the [`TaskDescriptor`] that captures everything
//!   needed to re-execute one task outside its original cluster,
//!   including the JSON dump format it is loaded from
//! - [`options`]: the typed [`TaskOptions`] configuration carried by
//!   tasks, with an open extension map for fields not yet promoted to
//!   typed form
//! - [`error`]: the session-level [`ReplayError`] taxonomy
//!
//! The crate performs no network I/O. The only filesystem access is
//! reading and writing descriptor dump files.

pub mod descriptor;
pub mod error;
pub mod options;

pub use descriptor::{DataChunkConfig, TaskDescriptor};
pub use error::ReplayError;
pub use options::TaskOptions;
