//! Audit sinks — where chained entries are delivered after being appended.

use covenant_core::error::AuditError;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::audit::AuditEntry;

/// Trait for audit log sinks.
///
/// A sink error never aborts the append that produced the entry; the logger
/// buffers the entry and retries later.
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        tracing::info!(
            seq = entry.sequence,
            event = %entry.event_type,
            actor = %entry.actor,
            contract = ?entry.contract_id,
            outcome = ?entry.outcome,
            old_state = ?entry.old_state,
            new_state = ?entry.new_state,
            hash = %entry.hash,
            "AUDIT"
        );
        Ok(())
    }
}

/// Appends one JSON entry per line to a file.
pub struct JsonlFileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlFileSink {
    /// Open (creating parents and the file as needed) for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AuditError::Io(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::Io(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlFileSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry).map_err(|e| AuditError::Parse(e.to_string()))?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| AuditError::SinkFailed {
                sink: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

/// Load a JSONL audit log. A missing file is an empty log.
pub fn read_jsonl(path: &Path) -> Result<Vec<AuditEntry>, AuditError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AuditError::Io(format!("{}: {e}", path.display()))),
    };

    let mut entries = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| AuditError::Io(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(&line)
            .map_err(|e| AuditError::Parse(format!("line {}: {e}", line_no + 1)))?;
        entries.push(entry);
    }
    Ok(entries)
}
