//! Reproducibility diff engine.
//!
//! Compares what a replay session recorded (a [`ReplayCapture`])
//! against a [`ReferenceSnapshot`] captured from the original
//! distributed run, producing a [`DiffReport`]. The comparison is pure
//! and read-only; a divergence is an informational finding, never a
//! fault. Exact matches are reported as explicit `Equal` outcomes per
//! category rather than silence.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use replay_core::{ReplayError, TaskOptions};

use crate::storage::{ResultRecord, StorageSnapshot, TaskRecord};

/// The local side of a comparison: the session's storage snapshot plus
/// the output bytes found on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayCapture {
    /// Everything the mock service recorded.
    pub storage: StorageSnapshot,

    /// Output bytes keyed by expected-output identifier. Only
    /// identifiers whose files existed at collection time appear.
    pub outputs: BTreeMap<String, Vec<u8>>,
}

impl ReplayCapture {
    /// Reads the output files for `expected_output_keys` from
    /// `data_folder`. Missing files are skipped: an absent output is a
    /// count discrepancy, not a collection failure.
    pub async fn collect_outputs(
        data_folder: &Path,
        expected_output_keys: &[String],
    ) -> BTreeMap<String, Vec<u8>> {
        let mut outputs = BTreeMap::new();
        for key in expected_output_keys {
            if let Ok(bytes) = tokio::fs::read(data_folder.join(key)).await {
                outputs.insert(key.clone(), bytes);
            }
        }
        outputs
    }
}

/// Ground truth to diff against: records and output bytes captured from
/// the original run, or a previously serialized session snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSnapshot {
    /// Result records keyed by result identifier.
    #[serde(default)]
    pub results: BTreeMap<String, ResultRecord>,

    /// Task records keyed by task identifier.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskRecord>,

    /// Output bytes keyed by expected-output identifier.
    #[serde(default)]
    pub outputs: BTreeMap<String, Vec<u8>>,
}

impl ReferenceSnapshot {
    /// Loads a reference from a JSON file. A serialized
    /// [`StorageSnapshot`] parses too (its `notified` field is ignored,
    /// and `outputs` defaults to empty).
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::MissingInput`] when the file is absent or
    /// does not parse.
    pub fn from_json_file(path: &Path) -> Result<Self, ReplayError> {
        let text = std::fs::read_to_string(path).map_err(|e| ReplayError::MissingInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ReplayError::MissingInput {
            path: path.to_path_buf(),
            reason: format!("invalid reference snapshot: {e}"),
        })
    }

    /// Builds a reference from a prior session's capture.
    #[must_use]
    pub fn from_capture(capture: ReplayCapture) -> Self {
        Self {
            results: capture.storage.results,
            tasks: capture.storage.tasks,
            outputs: capture.outputs,
        }
    }
}

/// One compared value: equal on both sides, or diverging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Comparison<T> {
    /// Both sides hold the same value.
    Equal {
        /// The shared value.
        value: T,
    },
    /// The sides diverge.
    Differs {
        /// Value on the replay side.
        local: T,
        /// Value on the reference side.
        reference: T,
    },
}

impl<T: PartialEq> Comparison<T> {
    fn of(local: T, reference: T) -> Self {
        if local == reference {
            Self::Equal { value: local }
        } else {
            Self::Differs { local, reference }
        }
    }

    /// Returns `true` for the `Equal` outcome.
    #[must_use]
    pub const fn is_equal(&self) -> bool {
        matches!(self, Self::Equal { .. })
    }
}

/// Byte-for-byte comparison of the single expected output.
///
/// Byte lengths are reported regardless of equality; the literal bytes
/// are carried only when the sides differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputComparison {
    /// Identifier of the output on the replay side.
    pub local_id: String,

    /// Identifier of the output on the reference side.
    pub reference_id: String,

    /// Byte length on the replay side.
    pub local_len: usize,

    /// Byte length on the reference side.
    pub reference_len: usize,

    /// `true` when the blobs are byte-for-byte equal.
    pub equal: bool,

    /// The replay-side bytes, present only on mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_bytes: Option<Vec<u8>>,

    /// The reference-side bytes, present only on mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_bytes: Option<Vec<u8>>,
}

/// Side-by-side rendering of one task-options or result-metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldComparison {
    /// Field name.
    pub field: &'static str,

    /// Rendered value on the replay side.
    pub local: String,

    /// Rendered value on the reference side.
    pub reference: String,
}

impl FieldComparison {
    fn of(field: &'static str, local: impl ToString, reference: impl ToString) -> Self {
        Self {
            field,
            local: local.to_string(),
            reference: reference.to_string(),
        }
    }

    /// Returns `true` when both sides render identically.
    #[must_use]
    pub fn is_equal(&self) -> bool {
        self.local == self.reference
    }
}

/// Structured discrepancy report for one replay session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffReport {
    /// Result-record counts on both sides.
    pub results_count: Comparison<usize>,

    /// Task-record counts on both sides.
    pub tasks_count: Comparison<usize>,

    /// Present when exactly one output blob exists on each side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_bytes: Option<OutputComparison>,

    /// Field table, present when exactly one submitted task and exactly
    /// one produced result exist on each side.
    pub fields: Vec<FieldComparison>,
}

impl DiffReport {
    /// Returns `true` when every compared category reported equality.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.results_count.is_equal()
            && self.tasks_count.is_equal()
            && self.output_bytes.as_ref().map_or(true, |o| o.equal)
            && self.fields.iter().all(FieldComparison::is_equal)
    }

    /// Human-readable lines, one per discrepancy found. Empty for an
    /// exact match.
    #[must_use]
    pub fn mismatches(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Comparison::Differs { local, reference } = &self.results_count {
            lines.push(format!(
                "results count: replay {local} vs reference {reference}"
            ));
        }
        if let Comparison::Differs { local, reference } = &self.tasks_count {
            lines.push(format!(
                "tasks count: replay {local} vs reference {reference}"
            ));
        }
        if let Some(output) = &self.output_bytes {
            if !output.equal {
                lines.push(format!(
                    "output bytes: {} ({} bytes) differs from {} ({} bytes)",
                    output.local_id, output.local_len, output.reference_id, output.reference_len
                ));
            }
        }
        for field in &self.fields {
            if !field.is_equal() {
                lines.push(format!(
                    "{}: replay {:?} vs reference {:?}",
                    field.field, field.local, field.reference
                ));
            }
        }
        lines
    }
}

/// Compares a replay capture against a reference snapshot.
#[must_use]
pub fn compare(local: &ReplayCapture, reference: &ReferenceSnapshot) -> DiffReport {
    DiffReport {
        results_count: Comparison::of(local.storage.results.len(), reference.results.len()),
        tasks_count: Comparison::of(local.storage.tasks.len(), reference.tasks.len()),
        output_bytes: compare_single_output(&local.outputs, &reference.outputs),
        fields: compare_single_pair(local, reference),
    }
}

/// Byte comparison, applicable only when each side holds exactly one
/// output blob.
fn compare_single_output(
    local: &BTreeMap<String, Vec<u8>>,
    reference: &BTreeMap<String, Vec<u8>>,
) -> Option<OutputComparison> {
    if local.len() != 1 || reference.len() != 1 {
        return None;
    }
    let (local_id, local_bytes) = local.iter().next()?;
    let (reference_id, reference_bytes) = reference.iter().next()?;
    let equal = local_bytes == reference_bytes;
    Some(OutputComparison {
        local_id: local_id.clone(),
        reference_id: reference_id.clone(),
        local_len: local_bytes.len(),
        reference_len: reference_bytes.len(),
        equal,
        local_bytes: (!equal).then(|| local_bytes.clone()),
        reference_bytes: (!equal).then(|| reference_bytes.clone()),
    })
}

/// Field table, applicable only when exactly one submitted task and
/// exactly one produced result exist on each side.
fn compare_single_pair(local: &ReplayCapture, reference: &ReferenceSnapshot) -> Vec<FieldComparison> {
    let single = |tasks: &BTreeMap<String, TaskRecord>, results: &BTreeMap<String, ResultRecord>| {
        if tasks.len() == 1 && results.len() == 1 {
            Some((
                tasks.values().next().cloned()?,
                results.values().next().cloned()?,
            ))
        } else {
            None
        }
    };

    let Some((local_task, local_result)) = single(&local.storage.tasks, &local.storage.results)
    else {
        return Vec::new();
    };
    let Some((reference_task, reference_result)) = single(&reference.tasks, &reference.results)
    else {
        return Vec::new();
    };

    let local_opts = local_task.task_options.unwrap_or_default();
    let reference_opts = reference_task.task_options.unwrap_or_default();

    let duration = |opts: &TaskOptions| {
        opts.max_duration
            .map_or_else(|| "unset".to_string(), |d| format!("{}ms", d.as_millis()))
    };

    vec![
        FieldComparison::of("priority", local_opts.priority, reference_opts.priority),
        FieldComparison::of(
            "max_duration",
            duration(&local_opts),
            duration(&reference_opts),
        ),
        FieldComparison::of(
            "max_retries",
            local_opts.max_retries,
            reference_opts.max_retries,
        ),
        FieldComparison::of(
            "partition_id",
            &local_opts.partition_id,
            &reference_opts.partition_id,
        ),
        FieldComparison::of(
            "application_name",
            &local_opts.application_name,
            &reference_opts.application_name,
        ),
        FieldComparison::of(
            "application_version",
            &local_opts.application_version,
            &reference_opts.application_version,
        ),
        FieldComparison::of(
            "application_namespace",
            &local_opts.application_namespace,
            &reference_opts.application_namespace,
        ),
        FieldComparison::of(
            "application_service",
            &local_opts.application_service,
            &reference_opts.application_service,
        ),
        FieldComparison::of(
            "engine_type",
            &local_opts.engine_type,
            &reference_opts.engine_type,
        ),
        FieldComparison::of("result_name", &local_result.name, &reference_result.name),
        FieldComparison::of(
            "result_size",
            local_result.data.as_ref().map_or(0, Vec::len),
            reference_result.data.as_ref().map_or(0, Vec::len),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::storage::ResultStatus;

    use super::*;

    fn result(id: &str, name: &str, data: Option<&[u8]>) -> ResultRecord {
        ResultRecord {
            result_id: id.to_string(),
            name: name.to_string(),
            status: ResultStatus::Created,
            session_id: "session".to_string(),
            created_at: Utc::now(),
            data: data.map(<[u8]>::to_vec),
        }
    }

    fn task(id: &str, options: Option<TaskOptions>) -> TaskRecord {
        TaskRecord {
            task_id: id.to_string(),
            payload_id: "payload".to_string(),
            data_dependencies: vec![],
            expected_output_keys: vec![],
            task_options: options,
        }
    }

    fn capture_with_output(id: &str, bytes: &[u8]) -> ReplayCapture {
        let mut capture = ReplayCapture::default();
        capture.outputs.insert(id.to_string(), bytes.to_vec());
        capture
    }

    #[test]
    fn empty_sides_report_equal_counts() {
        let report = compare(&ReplayCapture::default(), &ReferenceSnapshot::default());
        assert!(report.is_match());
        assert_eq!(report.results_count, Comparison::Equal { value: 0 });
        assert_eq!(report.tasks_count, Comparison::Equal { value: 0 });
        assert!(report.output_bytes.is_none());
        assert!(report.mismatches().is_empty());
    }

    #[test]
    fn count_divergence_is_reported() {
        let mut local = ReplayCapture::default();
        local
            .storage
            .results
            .insert("r1".to_string(), result("r1", "a", None));

        let report = compare(&local, &ReferenceSnapshot::default());
        assert!(!report.is_match());
        assert_eq!(
            report.results_count,
            Comparison::Differs {
                local: 1,
                reference: 0
            }
        );
        assert_eq!(report.mismatches().len(), 1);
    }

    #[test]
    fn identical_output_bytes_report_equal_with_lengths() {
        let local = capture_with_output("out", b"exactly");
        let reference = ReferenceSnapshot {
            outputs: BTreeMap::from([("out".to_string(), b"exactly".to_vec())]),
            ..ReferenceSnapshot::default()
        };

        let report = compare(&local, &reference);
        let output = report.output_bytes.unwrap();
        assert!(output.equal);
        assert_eq!(output.local_len, 7);
        assert_eq!(output.reference_len, 7);
        assert!(output.local_bytes.is_none());
    }

    #[test]
    fn one_changed_byte_is_a_mismatch_with_both_lengths() {
        let local = capture_with_output("out", b"exactlY");
        let reference = ReferenceSnapshot {
            outputs: BTreeMap::from([("out".to_string(), b"exactly".to_vec())]),
            ..ReferenceSnapshot::default()
        };

        let report = compare(&local, &reference);
        let output = report.output_bytes.as_ref().unwrap();
        assert!(!output.equal);
        assert_eq!(output.local_len, 7);
        assert_eq!(output.reference_len, 7);
        assert_eq!(output.local_bytes.as_deref(), Some(b"exactlY".as_slice()));
        assert!(!report.is_match());
    }

    #[test]
    fn differing_lengths_are_a_mismatch() {
        let local = capture_with_output("out", b"short");
        let reference = ReferenceSnapshot {
            outputs: BTreeMap::from([("out".to_string(), b"longer-output".to_vec())]),
            ..ReferenceSnapshot::default()
        };

        let output = compare(&local, &reference).output_bytes.unwrap();
        assert!(!output.equal);
        assert_eq!(output.local_len, 5);
        assert_eq!(output.reference_len, 13);
    }

    #[test]
    fn output_comparison_skipped_unless_single_on_both_sides() {
        let mut local = capture_with_output("out-1", b"a");
        local.outputs.insert("out-2".to_string(), b"b".to_vec());
        let reference = ReferenceSnapshot {
            outputs: BTreeMap::from([("out".to_string(), b"a".to_vec())]),
            ..ReferenceSnapshot::default()
        };

        assert!(compare(&local, &reference).output_bytes.is_none());
    }

    #[test]
    fn single_pair_field_table_compares_options_and_metadata() {
        let local_opts = TaskOptions {
            priority: 1,
            partition_id: "gpu".to_string(),
            ..TaskOptions::default()
        };
        let reference_opts = TaskOptions {
            priority: 2,
            partition_id: "gpu".to_string(),
            ..TaskOptions::default()
        };

        let mut local = ReplayCapture::default();
        local
            .storage
            .tasks
            .insert("t1".to_string(), task("t1", Some(local_opts)));
        local
            .storage
            .results
            .insert("r1".to_string(), result("r1", "out", Some(b"12345")));

        let mut reference = ReferenceSnapshot::default();
        reference
            .tasks
            .insert("t9".to_string(), task("t9", Some(reference_opts)));
        reference
            .results
            .insert("r9".to_string(), result("r9", "out", Some(b"12345")));

        let report = compare(&local, &reference);
        assert!(!report.fields.is_empty());

        let priority = report.fields.iter().find(|f| f.field == "priority").unwrap();
        assert!(!priority.is_equal());

        let partition = report
            .fields
            .iter()
            .find(|f| f.field == "partition_id")
            .unwrap();
        assert!(partition.is_equal());

        let size = report
            .fields
            .iter()
            .find(|f| f.field == "result_size")
            .unwrap();
        assert!(size.is_equal());
        assert_eq!(size.local, "5");
    }

    #[test]
    fn field_table_skipped_without_single_pair() {
        let mut local = ReplayCapture::default();
        local
            .storage
            .tasks
            .insert("t1".to_string(), task("t1", None));
        local
            .storage
            .tasks
            .insert("t2".to_string(), task("t2", None));
        local
            .storage
            .results
            .insert("r1".to_string(), result("r1", "out", None));

        let report = compare(&local, &ReferenceSnapshot::default());
        assert!(report.fields.is_empty());
    }

    #[test]
    fn reference_parses_from_serialized_snapshot() {
        let mut capture = ReplayCapture::default();
        capture
            .storage
            .results
            .insert("r1".to_string(), result("r1", "out", Some(b"true")));
        capture.storage.notified.insert("r1".to_string());

        let json = serde_json::to_string(&capture.storage).unwrap();
        let reference: ReferenceSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(reference.results.len(), 1);
        assert!(reference.outputs.is_empty());
    }
}
