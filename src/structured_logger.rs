//! Structured JSONL logger for registry diagnostics.
//!
//! This module provides machine-parseable logging with:
//! - Monotonic sequence numbers for ordering
//! - ISO 8601 timestamps with microsecond precision
//! - Registry and session IDs for correlation
//! - Structured event data in JSON format

use crate::handle::Handle;
use crate::value::ExecutionId;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Structured JSONL logger shared by every session of a registry.
pub struct StructuredLogger {
    registry_id: String,
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

/// A single log entry in JSONL format.
#[derive(Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number (unique across the registry's lifetime)
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds
    pub ts: String,
    /// Registry ID
    pub registry_id: String,
    /// Component that emitted the log
    pub component: String,
    /// Structured event data
    pub event: Value,
}

impl StructuredLogger {
    /// Creates a new structured logger for the given registry.
    ///
    /// Logs are appended to `<logs_dir>/events.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The logs directory cannot be created
    /// - The log file cannot be opened
    pub fn new(registry_id: &str, logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            registry_id: registry_id.to_string(),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Logs a structured event as a single line.
    ///
    /// Write failures are swallowed; diagnostics must never disturb a
    /// debugging session.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            registry_id: self.registry_id.clone(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(line) = serde_json::to_string(&entry) {
            let mut file = self.log_file.lock();
            let _ = writeln!(file, "{}", line);
            let _ = file.flush();
        }
    }

    pub fn log_session_opened(&self, session: Uuid) {
        self.log(
            "Session",
            serde_json::json!({
                "type": "Opened",
                "session": session
            }),
        );
    }

    /// Logs a frame chain being tracked for a thread or sub-execution.
    pub fn log_frames_tracked(
        &self,
        session: Uuid,
        thread_id: &ExecutionId,
        execution_id: &ExecutionId,
        frames: usize,
    ) {
        self.log(
            "Session",
            serde_json::json!({
                "type": "FramesTracked",
                "session": session,
                "thread_id": thread_id,
                "execution_id": execution_id,
                "frames": frames
            }),
        );
    }

    /// Logs a thread id taken over by a new session before the old one resumed.
    pub fn log_double_track(&self, session: Uuid, execution_id: &ExecutionId, previous: Uuid) {
        self.log(
            "Session",
            serde_json::json!({
                "type": "DoubleTrack",
                "session": session,
                "execution_id": execution_id,
                "previous_session": previous
            }),
        );
    }

    pub fn log_session_closed(&self, session: Uuid, released_handles: usize) {
        self.log(
            "Session",
            serde_json::json!({
                "type": "Closed",
                "session": session,
                "released_handles": released_handles
            }),
        );
    }

    /// Logs a handle found by scanning sessions instead of through the index.
    pub fn log_index_miss(&self, handle: Handle, session: Uuid) {
        self.log(
            "Registry",
            serde_json::json!({
                "type": "IndexMiss",
                "handle": handle,
                "session": session
            }),
        );
    }

    pub fn log_frame_lookup_failed(&self, thread_id: &ExecutionId, frame_id: &str, error: &str) {
        self.log(
            "Registry",
            serde_json::json!({
                "type": "FrameLookupFailed",
                "thread_id": thread_id,
                "frame_id": frame_id,
                "error": error
            }),
        );
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn registry_id(&self) -> &str {
        &self.registry_id
    }
}

#[cfg(test)]
#[path = "tests/structured_logger_tests.rs"]
mod tests;
