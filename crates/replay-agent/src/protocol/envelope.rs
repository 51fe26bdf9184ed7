//! Tag-byte envelopes routing wire messages over framed connections.
//!
//! Every frame is `[tag: u8][payload: protobuf]`. The tag identifies the
//! message type before decoding, so the dispatcher can route to the
//! right handler; tag 0 is reserved for error payloads on the reply
//! direction. The agent and worker directions use separate envelopes
//! because they never share a connection.

use bytes::Bytes;
use prost::Message;

use super::error::{ProtocolError, ProtocolResult};
use super::wire::{
    AgentError, CreateResultsMetaDataRequest, CreateResultsMetaDataResponse, CreateResultsRequest,
    CreateResultsResponse, NotifyResultDataRequest, NotifyResultDataResponse, ProcessReply,
    ProcessRequest, SubmitTasksRequest, SubmitTasksResponse,
};

/// Message type tags for agent operation routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AgentMessageType {
    /// `CreateResults` operation.
    CreateResults = 1,
    /// `CreateResultsMetaData` operation.
    CreateResultsMetaData = 2,
    /// `NotifyResultData` operation.
    NotifyResultData = 3,
    /// `SubmitTasks` operation.
    SubmitTasks = 4,
}

impl AgentMessageType {
    /// Attempts to parse a message type from a tag byte.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::CreateResults),
            2 => Some(Self::CreateResultsMetaData),
            3 => Some(Self::NotifyResultData),
            4 => Some(Self::SubmitTasks),
            _ => None,
        }
    }

    /// Returns the tag byte for this message type.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

/// One decoded agent call.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCall {
    /// `CreateResults` request.
    CreateResults(CreateResultsRequest),
    /// `CreateResultsMetaData` request.
    CreateResultsMetaData(CreateResultsMetaDataRequest),
    /// `NotifyResultData` request.
    NotifyResultData(NotifyResultDataRequest),
    /// `SubmitTasks` request.
    SubmitTasks(SubmitTasksRequest),
}

impl AgentCall {
    /// Encodes the call to a tag-prefixed frame payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let (tag, payload) = match self {
            Self::CreateResults(req) => (AgentMessageType::CreateResults, req.encode_to_vec()),
            Self::CreateResultsMetaData(req) => {
                (AgentMessageType::CreateResultsMetaData, req.encode_to_vec())
            },
            Self::NotifyResultData(req) => (AgentMessageType::NotifyResultData, req.encode_to_vec()),
            Self::SubmitTasks(req) => (AgentMessageType::SubmitTasks, req.encode_to_vec()),
        };
        prefixed(tag.tag(), payload)
    }

    /// Decodes a call from a tag-prefixed frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidFrame`] for an empty frame or an
    /// unknown tag, and [`ProtocolError::Decode`] for a malformed
    /// payload.
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        let (tag, payload) = split_tag(frame)?;
        let message_type = AgentMessageType::from_tag(tag)
            .ok_or_else(|| ProtocolError::invalid_frame(format!("unknown call tag {tag}")))?;
        Ok(match message_type {
            AgentMessageType::CreateResults => {
                Self::CreateResults(CreateResultsRequest::decode(payload)?)
            },
            AgentMessageType::CreateResultsMetaData => {
                Self::CreateResultsMetaData(CreateResultsMetaDataRequest::decode(payload)?)
            },
            AgentMessageType::NotifyResultData => {
                Self::NotifyResultData(NotifyResultDataRequest::decode(payload)?)
            },
            AgentMessageType::SubmitTasks => Self::SubmitTasks(SubmitTasksRequest::decode(payload)?),
        })
    }
}

/// One agent reply, mirroring [`AgentCall`] plus the error arm.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    /// `CreateResults` response.
    CreateResults(CreateResultsResponse),
    /// `CreateResultsMetaData` response.
    CreateResultsMetaData(CreateResultsMetaDataResponse),
    /// `NotifyResultData` response.
    NotifyResultData(NotifyResultDataResponse),
    /// `SubmitTasks` response.
    SubmitTasks(SubmitTasksResponse),
    /// Error reply (tag 0).
    Error(AgentError),
}

impl AgentReply {
    /// Builds an error reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(AgentError {
            message: message.into(),
        })
    }

    /// Encodes the reply to a tag-prefixed frame payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let (tag, payload) = match self {
            Self::CreateResults(resp) => {
                (AgentMessageType::CreateResults.tag(), resp.encode_to_vec())
            },
            Self::CreateResultsMetaData(resp) => (
                AgentMessageType::CreateResultsMetaData.tag(),
                resp.encode_to_vec(),
            ),
            Self::NotifyResultData(resp) => {
                (AgentMessageType::NotifyResultData.tag(), resp.encode_to_vec())
            },
            Self::SubmitTasks(resp) => (AgentMessageType::SubmitTasks.tag(), resp.encode_to_vec()),
            Self::Error(err) => (0, err.encode_to_vec()),
        };
        prefixed(tag, payload)
    }

    /// Decodes a reply from a tag-prefixed frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidFrame`] for an empty frame or an
    /// unknown tag, and [`ProtocolError::Decode`] for a malformed
    /// payload.
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        let (tag, payload) = split_tag(frame)?;
        if tag == 0 {
            return Ok(Self::Error(AgentError::decode(payload)?));
        }
        let message_type = AgentMessageType::from_tag(tag)
            .ok_or_else(|| ProtocolError::invalid_frame(format!("unknown reply tag {tag}")))?;
        Ok(match message_type {
            AgentMessageType::CreateResults => {
                Self::CreateResults(CreateResultsResponse::decode(payload)?)
            },
            AgentMessageType::CreateResultsMetaData => {
                Self::CreateResultsMetaData(CreateResultsMetaDataResponse::decode(payload)?)
            },
            AgentMessageType::NotifyResultData => {
                Self::NotifyResultData(NotifyResultDataResponse::decode(payload)?)
            },
            AgentMessageType::SubmitTasks => {
                Self::SubmitTasks(SubmitTasksResponse::decode(payload)?)
            },
        })
    }
}

/// Tag byte for the worker's `Process` operation.
const WORKER_PROCESS_TAG: u8 = 1;

/// One decoded worker call.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCall {
    /// `Process` request.
    Process(ProcessRequest),
}

impl WorkerCall {
    /// Encodes the call to a tag-prefixed frame payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Process(req) => prefixed(WORKER_PROCESS_TAG, req.encode_to_vec()),
        }
    }

    /// Decodes a call from a tag-prefixed frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidFrame`] for an empty frame or an
    /// unknown tag, and [`ProtocolError::Decode`] for a malformed
    /// payload.
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        let (tag, payload) = split_tag(frame)?;
        if tag != WORKER_PROCESS_TAG {
            return Err(ProtocolError::invalid_frame(format!(
                "unknown worker call tag {tag}"
            )));
        }
        Ok(Self::Process(ProcessRequest::decode(payload)?))
    }
}

/// One worker reply.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReply {
    /// `Process` reply.
    Process(ProcessReply),
    /// Error reply (tag 0).
    Error(AgentError),
}

impl WorkerReply {
    /// Encodes the reply to a tag-prefixed frame payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Process(reply) => prefixed(WORKER_PROCESS_TAG, reply.encode_to_vec()),
            Self::Error(err) => prefixed(0, err.encode_to_vec()),
        }
    }

    /// Decodes a reply from a tag-prefixed frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidFrame`] for an empty frame or an
    /// unknown tag, and [`ProtocolError::Decode`] for a malformed
    /// payload.
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        let (tag, payload) = split_tag(frame)?;
        if tag == 0 {
            return Ok(Self::Error(AgentError::decode(payload)?));
        }
        if tag != WORKER_PROCESS_TAG {
            return Err(ProtocolError::invalid_frame(format!(
                "unknown worker reply tag {tag}"
            )));
        }
        Ok(Self::Process(ProcessReply::decode(payload)?))
    }
}

/// Prepends the tag byte to an encoded payload.
fn prefixed(tag: u8, payload: Vec<u8>) -> Bytes {
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(tag);
    buf.extend_from_slice(&payload);
    Bytes::from(buf)
}

/// Splits a frame into its tag byte and payload.
fn split_tag(frame: &[u8]) -> ProtocolResult<(u8, &[u8])> {
    match frame.split_first() {
        Some((tag, payload)) => Ok((*tag, payload)),
        None => Err(ProtocolError::invalid_frame("empty frame")),
    }
}
