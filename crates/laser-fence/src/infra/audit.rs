//! Audit trail for inspection decisions.
//!
//! Every verdict, skipped measurement and lifecycle change is appended to a
//! JSONL file so a shift's rejects can be reconstructed afterwards.

use chrono::{DateTime, Utc};
use inspect_core::{ConveyorStatus, InspectionStats, QualityVerdict};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// System startup
    SystemStart,
    /// Conveyor soft start finished or was cancelled
    ConveyorStarted,
    /// An item was classified
    Verdict,
    /// A measurement line could not be parsed and was skipped
    ParseError,
    /// Inspection stopped on an unrecoverable error
    FatalError,
    /// Clean shutdown
    SystemShutdown,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Opens `path` in append mode, creating parent directories as needed.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: AuditEntry) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit writer poisoned"))?;
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        timestamp_us: u64,
        unix_us: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> io::Result<()> {
        self.log(AuditEntry {
            timestamp_us,
            unix_us,
            event_type,
            details,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerdictDetails {
    pub sequence_id: i64,
    pub score: i64,
    pub passed: bool,
    pub observed_at: DateTime<Utc>,
}

impl From<&QualityVerdict> for VerdictDetails {
    fn from(verdict: &QualityVerdict) -> Self {
        Self {
            sequence_id: verdict.sequence_id,
            score: verdict.score,
            passed: verdict.passed,
            observed_at: verdict.observed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConveyorDetails {
    pub completed: bool,
    pub steps: usize,
    pub motor_current: Option<f64>,
    pub encoder_position: Option<u16>,
}

impl From<&ConveyorStatus> for ConveyorDetails {
    fn from(status: &ConveyorStatus) -> Self {
        Self {
            completed: status.ramp.completed(),
            steps: status.ramp.steps.len(),
            motor_current: status.motor_current,
            encoder_position: status.encoder_position,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShutdownDetails<'a> {
    pub stats: &'a InspectionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_audit_logger_writes_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit").join("line.jsonl");

        let logger = AuditLogger::new(&path).unwrap();
        logger
            .log_event(
                1000,
                1_438_171_200_000_000,
                AuditEventType::SystemStart,
                serde_json::json!({"threshold": 999}),
            )
            .unwrap();

        let verdict = QualityVerdict {
            sequence_id: 7,
            score: 1200,
            passed: false,
            observed_at: Utc.timestamp_opt(1_438_171_201, 0).unwrap(),
        };
        logger
            .log_event(
                2000,
                1_438_171_201_000_000,
                AuditEventType::Verdict,
                serde_json::to_value(VerdictDetails::from(&verdict)).unwrap(),
            )
            .unwrap();

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();

        let lines: Vec<&str> = content.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.timestamp_us, 1000);
        assert_eq!(first.event_type, AuditEventType::SystemStart);

        let second: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.event_type, AuditEventType::Verdict);
        assert_eq!(second.details["sequence_id"], 7);
        assert_eq!(second.details["passed"], false);
        assert!(lines[1].contains("\"event_type\":\"verdict\""));
    }

    #[test]
    fn reopening_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        for ts in [1, 2] {
            let logger = AuditLogger::new(&path).unwrap();
            logger
                .log_event(ts, ts, AuditEventType::SystemShutdown, serde_json::json!({}))
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
