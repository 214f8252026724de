//! Audit Trail
//!
//! One append-only record per decision point of a run. The orchestrator
//! writes each entry before the run proceeds; a sink that cannot record
//! an entry fails the run.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::risk::{InterventionType, RoutingDecision};

/// Audit record for one decision point.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub run_id: String,
    pub workflow_id: String,
    /// `global`, `step_<n>` or `final`
    pub decision_point: String,
    pub triggered_rule_ids: Vec<String>,
    pub routing_decision: RoutingDecision,
    pub intervention_type: InterventionType,
    pub risk_before: f64,
    pub risk_contribution: f64,
    pub risk_after: f64,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Unavailable("memory sink lock poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }
}

/// Appends one JSON document per line to a file.
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads back every entry in a JSON-lines audit file.
    pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>, AuditError> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                entries.push(serde_json::from_str(&line)?);
            }
        }
        Ok(entries)
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| AuditError::Unavailable(format!("{} lock poisoned", self.path.display())))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!("Audit {} {} -> {}", entry.run_id, entry.decision_point, self.path.display());
        Ok(())
    }
}
