//! replay-agent - Local task replay harness library
//!
//! This library hosts a mock control-plane agent over a Unix domain
//! socket, orchestrates single-task replay sessions against a worker,
//! and diffs the captured output against a reference snapshot. It
//! exists to reproduce a failing or suspicious task from a distributed
//! run entirely on one machine, with full visibility into what the
//! worker asked of the control plane.
//!
//! # Runtime Requirements
//!
//! The server and session layers require a tokio runtime with the
//! `net`, `io-util`, `sync`, `time`, and `fs` features. The
//! `replay-cli` binary configures `#[tokio::main]` accordingly; when
//! embedding the library, bring your own runtime.
//!
//! # Modules
//!
//! - [`agent`]: The mock control plane and the [`agent::ControlPlane`]
//!   trait it implements
//! - [`client`]: In-process client for exercising a running agent
//!   socket
//! - [`diff`]: Reproducibility diff engine comparing a capture against
//!   a reference snapshot
//! - [`protocol`]: UDS wire protocol, message framing, and envelopes
//! - [`server`]: Socket lifecycle and per-connection dispatch
//! - [`session`]: Replay orchestrator wiring descriptor, agent, and
//!   worker together
//! - [`storage`]: Concurrent in-memory record store and its serialized
//!   snapshot form
//! - [`worker`]: The [`worker::ProcessWorker`] seam and its UDS-backed
//!   implementation

pub mod agent;
pub mod client;
pub mod diff;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod worker;

pub use agent::{ControlPlane, ReplayAgent};
pub use client::AgentClient;
pub use diff::{compare, DiffReport, ReferenceSnapshot, ReplayCapture};
pub use server::AgentServer;
pub use session::{ReplaySession, SessionConfig, SessionOutput};
pub use storage::{AgentStorage, StorageSnapshot};
pub use worker::{ProcessWorker, UdsWorkerClient};
