//! task-replay - Local task replay harness
//!
//! Re-runs one captured task against a local worker process, recording
//! every control-plane call the worker makes and optionally diffing the
//! produced output against a reference snapshot from the original run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use replay_agent::session::{default_agent_socket_path, default_worker_socket_path};
use replay_agent::{
    compare, ReferenceSnapshot, ReplaySession, SessionConfig, SessionOutput, UdsWorkerClient,
};
use replay_core::TaskDescriptor;

/// task-replay - Local task replay harness
#[derive(Parser, Debug)]
#[command(name = "task-replay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the task dump file (JSON descriptor)
    #[arg(short, long, default_value = "/tmp/task-replay/task.json")]
    path: PathBuf,

    /// Folder where input and output blobs are staged
    #[arg(long)]
    data_folder: Option<PathBuf>,

    /// Unix socket the mock control-plane agent binds
    #[arg(long)]
    agent_socket: Option<PathBuf>,

    /// Unix socket the worker listens on
    #[arg(long)]
    worker_socket: Option<PathBuf>,

    /// Reference snapshot (JSON) to diff the replay against
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Write the session's capture to this file after the run
    #[arg(long)]
    save_snapshot: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // A missing dump file is the first-run case: generate an editable
    // sample instead of failing.
    if !cli.path.exists() {
        write_sample_dump(&cli.path)?;
        info!(
            path = %cli.path.display(),
            "no dump file found; wrote a sample descriptor. Edit it to describe \
             the task to replay, then run again"
        );
        return Ok(());
    }

    let config = SessionConfig {
        agent_socket: cli.agent_socket.unwrap_or_else(default_agent_socket_path),
        data_folder: cli
            .data_folder
            .unwrap_or_else(|| std::env::temp_dir().join("task-replay").join("data")),
    };
    let worker_socket = cli.worker_socket.unwrap_or_else(default_worker_socket_path);

    let session = ReplaySession::from_dump_file(&cli.path, config)
        .with_context(|| format!("failed to load dump from {}", cli.path.display()))?;

    info!(
        task_id = %session.descriptor().task_id,
        session_id = %session.descriptor().session_id,
        agent_socket = %session.config().agent_socket.display(),
        worker_socket = %worker_socket.display(),
        "starting replay session"
    );

    let worker = UdsWorkerClient::new(worker_socket);
    let output = session.run(&worker).await.context("replay session failed")?;

    info!(
        results = output.capture.storage.results.len(),
        tasks = output.capture.storage.tasks.len(),
        notified = output.capture.storage.notified.len(),
        outputs = output.capture.outputs.len(),
        data_folder = %output.data_folder.display(),
        "replay session finished"
    );
    render_capture(&output).await;

    if let Some(path) = &cli.save_snapshot {
        let json = serde_json::to_string_pretty(&output.capture)
            .context("failed to serialize capture")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        info!(path = %path.display(), "capture snapshot written");
    }

    if let Some(path) = &cli.reference {
        let reference = ReferenceSnapshot::from_json_file(path)
            .with_context(|| format!("failed to load reference from {}", path.display()))?;
        let report = compare(&output.capture, &reference);
        if report.is_match() {
            info!("replay matches the reference snapshot");
        } else {
            for line in report.mismatches() {
                warn!("{line}");
            }
        }
        for field in &report.fields {
            info!(
                field = field.field,
                local = %field.local,
                reference = %field.reference,
                equal = field.is_equal(),
                "field comparison"
            );
        }
    }

    match output.worker_outcome {
        Ok(()) => {
            info!("worker completed the task");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "worker did not complete the task");
            Err(err).context("worker processing failed")
        }
    }
}

/// Writes an editable sample descriptor to `path`, creating parent
/// directories as needed.
fn write_sample_dump(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    TaskDescriptor::sample()
        .to_json_file(path)
        .with_context(|| format!("failed to write sample dump to {}", path.display()))
}

/// Logs every recorded artifact of the session: each created result,
/// each submitted task, and the on-disk bytes of each notified result.
async fn render_capture(output: &SessionOutput) {
    for (result_id, record) in &output.capture.storage.results {
        info!(
            result_id = %result_id,
            name = %record.name,
            status = ?record.status,
            bytes = record.data.as_ref().map_or(0, Vec::len),
            "result created"
        );
    }
    for (task_id, task) in &output.capture.storage.tasks {
        info!(
            task_id = %task_id,
            payload_id = %task.payload_id,
            data_dependencies = ?task.data_dependencies,
            expected_outputs = ?task.expected_output_keys,
            "task submitted"
        );
    }
    for result_id in &output.capture.storage.notified {
        match tokio::fs::read(output.data_folder.join(result_id)).await {
            Ok(bytes) => info!(
                result_id = %result_id,
                bytes = bytes.len(),
                data = %String::from_utf8_lossy(&bytes),
                "notified result data"
            ),
            Err(e) => warn!(
                result_id = %result_id,
                "notified result has no readable file: {e}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_dump_lands_in_a_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("task.json");

        write_sample_dump(&path).unwrap();

        let descriptor = TaskDescriptor::from_json_file(&path).unwrap();
        assert!(!descriptor.payload_id.is_empty());
        assert!(descriptor.raw_data.contains_key(&descriptor.payload_id));
    }
}
