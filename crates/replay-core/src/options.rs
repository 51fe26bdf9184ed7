//! Typed task options.
//!
//! The original control plane carries task options as a schema-less
//! key/value bag. Here the well-known fields are promoted to typed form,
//! and anything not yet promoted travels in the open [`TaskOptions::options`]
//! extension map.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration attached to a task submission.
///
/// All fields are preserved verbatim through the replay harness; the
/// mock service never merges or rewrites options, it stores what was
/// passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Scheduling priority.
    pub priority: i32,

    /// Maximum number of retries before the task is considered failed.
    pub max_retries: i32,

    /// Maximum wall-clock duration granted to the task.
    pub max_duration: Option<Duration>,

    /// Partition the task is scheduled on.
    pub partition_id: String,

    /// Name of the application the task belongs to.
    pub application_name: String,

    /// Version of the application the task belongs to.
    pub application_version: String,

    /// Namespace of the application service.
    pub application_namespace: String,

    /// Service within the application handling the task.
    pub application_service: String,

    /// Engine type requested for execution.
    pub engine_type: String,

    /// Open extension map for fields not promoted to typed form.
    pub options: BTreeMap<String, String>,
}

impl TaskOptions {
    /// Sets one entry of the extension map, builder style.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_empty() {
        let opts = TaskOptions::default();
        assert_eq!(opts.priority, 0);
        assert_eq!(opts.max_retries, 0);
        assert!(opts.max_duration.is_none());
        assert!(opts.options.is_empty());
    }

    #[test]
    fn extension_map_round_trips_through_json() {
        let opts = TaskOptions {
            priority: 2,
            max_retries: 5,
            max_duration: Some(Duration::from_secs(300)),
            partition_id: "gpu".to_string(),
            application_name: "demo".to_string(),
            ..TaskOptions::default()
        }
        .with_option("UseCase", "Launch");

        let json = serde_json::to_string(&opts).unwrap();
        let back: TaskOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
        assert_eq!(back.options.get("UseCase").map(String::as_str), Some("Launch"));
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let back: TaskOptions = serde_json::from_str(r#"{"priority": 7}"#).unwrap();
        assert_eq!(back.priority, 7);
        assert!(back.partition_id.is_empty());
        assert!(back.max_duration.is_none());
    }
}
