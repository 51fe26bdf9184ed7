//! Task descriptor: the unit of replay input.
//!
//! A [`TaskDescriptor`] captures everything needed to re-execute one
//! task outside its original cluster: identifiers, options, the
//! data-dependency and expected-output identifier lists, the chunking
//! configuration, and either a folder where dependency bytes are staged
//! or the raw bytes inline.
//!
//! Descriptors are constructed once (usually from a JSON dump written by
//! an extraction tool), consumed read-only by the orchestrator, and
//! never mutated after load except to fill in a missing communication
//! token.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReplayError;
use crate::options::TaskOptions;

/// Chunking configuration for streamed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChunkConfig {
    /// Maximum size of one data chunk, in bytes.
    pub max_chunk_size: u32,
}

impl Default for DataChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 84_000,
        }
    }
}

/// Everything needed to replay one unit of work locally.
///
/// The payload and task identifiers are always present; every identifier
/// listed in [`data_dependencies`](Self::data_dependencies) or
/// [`expected_output_keys`](Self::expected_output_keys) must resolve to
/// either a staged file or an inline [`raw_data`](Self::raw_data) entry
/// before the worker is invoked. That resolution is checked by the
/// orchestrator, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Session the task originally ran in.
    pub session_id: String,

    /// Identifier of the task's payload blob.
    pub payload_id: String,

    /// Identifier of the task itself.
    pub task_id: String,

    /// Options the task ran with. Absent when the original submission
    /// relied entirely on session defaults.
    #[serde(default)]
    pub task_options: Option<TaskOptions>,

    /// Identifiers of the task's data dependencies, in submission order.
    #[serde(default)]
    pub data_dependencies: Vec<String>,

    /// Identifiers of the task's expected outputs, in submission order.
    #[serde(default)]
    pub expected_output_keys: Vec<String>,

    /// Chunking configuration passed through to the worker.
    #[serde(default)]
    pub configuration: DataChunkConfig,

    /// Folder where dependency and payload bytes are staged on disk.
    /// When absent, bytes come from [`raw_data`](Self::raw_data) and are
    /// materialized into a caller-chosen folder before the worker runs.
    #[serde(default)]
    pub data_folder: Option<PathBuf>,

    /// Inline bytes keyed by identifier, used when data is embedded in
    /// the dump rather than staged on disk. A `None` entry declares the
    /// identifier without carrying bytes (an output placeholder).
    #[serde(default)]
    pub raw_data: BTreeMap<String, Option<Vec<u8>>>,

    /// Opaque session credential echoed between worker and mock service.
    /// Synthesized by the orchestrator when empty.
    #[serde(default)]
    pub communication_token: Option<String>,
}

impl TaskDescriptor {
    /// Loads a descriptor from a JSON dump file.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::MissingInput`] if the file cannot be read
    /// or does not parse as a descriptor.
    pub fn from_json_file(path: &Path) -> Result<Self, ReplayError> {
        let text = fs::read_to_string(path).map_err(|e| ReplayError::MissingInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ReplayError::MissingInput {
            path: path.to_path_buf(),
            reason: format!("invalid descriptor dump: {e}"),
        })
    }

    /// Writes the descriptor to a JSON dump file.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::MissingInput`] if the file cannot be
    /// written (the dump path is the session's required input).
    pub fn to_json_file(&self, path: &Path) -> Result<(), ReplayError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| ReplayError::MissingInput {
            path: path.to_path_buf(),
            reason: format!("descriptor serialization failed: {e}"),
        })?;
        fs::write(path, text).map_err(|e| ReplayError::MissingInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Returns the communication token, synthesizing a fresh one first
    /// if the descriptor carries none. This is the only mutation a
    /// descriptor undergoes after load.
    pub fn ensure_communication_token(&mut self) -> &str {
        let needs_token = self
            .communication_token
            .as_ref()
            .map_or(true, |token| token.is_empty());
        if needs_token {
            self.communication_token = Some(Uuid::new_v4().to_string());
        }
        self.communication_token
            .as_deref()
            .unwrap_or_default()
    }

    /// Iterates over every identifier whose bytes the worker will read
    /// from the data folder: the payload, then the data dependencies,
    /// then the expected output keys.
    pub fn referenced_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.payload_id.as_str())
            .chain(self.data_dependencies.iter().map(String::as_str))
            .chain(self.expected_output_keys.iter().map(String::as_str))
    }

    /// Builds a self-contained example descriptor with inline data, the
    /// same shape the extraction tool writes when asked for a seed dump:
    /// one data dependency, one expected output key, a small payload,
    /// and a `UseCase=Launch` option.
    #[must_use]
    pub fn sample() -> Self {
        let payload_id = Uuid::new_v4().to_string();
        let dd1 = Uuid::new_v4().to_string();
        let eok1 = Uuid::new_v4().to_string();

        let mut raw_data = BTreeMap::new();
        raw_data.insert(payload_id.clone(), Some(b"Payload".to_vec()));
        raw_data.insert(dd1.clone(), Some(b"DataDependency1".to_vec()));
        raw_data.insert(eok1.clone(), None);

        Self {
            session_id: Uuid::new_v4().to_string(),
            payload_id,
            task_id: Uuid::new_v4().to_string(),
            task_options: Some(TaskOptions::default().with_option("UseCase", "Launch")),
            data_dependencies: vec![dd1],
            expected_output_keys: vec![eok1],
            configuration: DataChunkConfig { max_chunk_size: 84 },
            data_folder: None,
            raw_data,
            communication_token: Some(Uuid::new_v4().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");

        let descriptor = TaskDescriptor::sample();
        descriptor.to_json_file(&path).unwrap();
        let back = TaskDescriptor::from_json_file(&path).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn missing_dump_is_missing_input() {
        let err = TaskDescriptor::from_json_file(Path::new("/nonexistent/dump.json")).unwrap_err();
        assert!(matches!(err, ReplayError::MissingInput { .. }));
    }

    #[test]
    fn malformed_dump_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        fs::write(&path, "{not json").unwrap();

        let err = TaskDescriptor::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ReplayError::MissingInput { .. }));
    }

    #[test]
    fn token_synthesized_when_absent() {
        let mut descriptor = TaskDescriptor::sample();
        descriptor.communication_token = None;
        let token = descriptor.ensure_communication_token().to_string();
        assert!(!token.is_empty());
        // A second call keeps the synthesized token.
        assert_eq!(descriptor.ensure_communication_token(), token);
    }

    #[test]
    fn token_preserved_when_present() {
        let mut descriptor = TaskDescriptor::sample();
        descriptor.communication_token = Some("token-1".to_string());
        assert_eq!(descriptor.ensure_communication_token(), "token-1");
    }

    #[test]
    fn referenced_ids_cover_payload_dependencies_and_outputs() {
        let descriptor = TaskDescriptor::sample();
        let ids: Vec<&str> = descriptor.referenced_ids().collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], descriptor.payload_id);
    }

    #[test]
    fn sample_inline_data_covers_every_referenced_id() {
        let descriptor = TaskDescriptor::sample();
        for id in descriptor.referenced_ids() {
            assert!(descriptor.raw_data.contains_key(id), "missing inline entry for {id}");
        }
    }
}
