//! UDS protocol and framing for the replay harness.
//!
//! The protocol stack is organized in layers:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Application Messages            │  Protobuf (wire)
//! ├─────────────────────────────────────────┤
//! │             Envelopes                   │  Tag byte routing
//! ├─────────────────────────────────────────┤
//! │              Framing                    │  Length-prefixed
//! ├─────────────────────────────────────────┤
//! │           UDS Transport                 │  Unix socket
//! └─────────────────────────────────────────┘
//! ```
//!
//! - [`error`]: protocol error types ([`ProtocolError`], [`ProtocolResult`])
//! - [`framing`]: length-prefixed frame codec ([`FrameCodec`])
//! - [`wire`]: prost message types for the agent and worker operations
//! - [`envelope`]: tag-byte request/reply envelopes
//!
//! Both endpoints are loopback-only Unix sockets; nothing here is
//! network exposed or participates in discovery.

pub mod envelope;
pub mod error;
pub mod framing;
pub mod wire;

pub use envelope::{AgentCall, AgentMessageType, AgentReply, WorkerCall, WorkerReply};
pub use error::{MAX_FRAME_SIZE, ProtocolError, ProtocolResult};
pub use framing::FrameCodec;
