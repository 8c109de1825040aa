//! Human-readable audit trail
//!
//! Every mutating store call appends one line of the form
//! `[<timestamp>] <OPERATION> <key=value...>`. The store never reads the
//! trail back; [`AuditLog::entries`] exists for display.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::StoreResult;

/// Timestamp format used in audit lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Category of an audit line, derived from its leading operation word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditCategory {
    Add,
    Delete,
    Update,
    Supply,
    Sell,
    /// Backup, restore and export
    Service,
    Other,
}

impl AuditCategory {
    /// Classify a message by its operation word
    pub fn classify(message: &str) -> Self {
        let upper = message.trim_start().to_ascii_uppercase();
        if upper.starts_with("INSERT") || upper.starts_with("ADD") {
            AuditCategory::Add
        } else if upper.starts_with("DELETE") {
            AuditCategory::Delete
        } else if upper.starts_with("UPDATE") {
            AuditCategory::Update
        } else if upper.starts_with("SUPPLY") {
            AuditCategory::Supply
        } else if upper.starts_with("SELL") {
            AuditCategory::Sell
        } else if ["BACKUP", "RESTORE", "EXPORT", "IMPORT"]
            .iter()
            .any(|op| upper.starts_with(op))
        {
            AuditCategory::Service
        } else {
            AuditCategory::Other
        }
    }
}

/// One parsed audit line
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub timestamp: String,
    pub category: AuditCategory,
    pub message: String,
}

impl AuditEntry {
    /// Parse `[<timestamp>] <message>`; `None` if the line has another shape
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix('[')?;
        let (timestamp, message) = rest.split_once(']')?;
        let message = message.trim();
        Some(AuditEntry {
            timestamp: timestamp.to_string(),
            category: AuditCategory::classify(message),
            message: message.to_string(),
        })
    }
}

/// Append-only audit log file
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        AuditLog { path }
    }

    /// An audit log that records nothing
    pub fn disabled() -> Self {
        AuditLog { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one line. Failures are logged and swallowed.
    pub fn record(&self, operation: &str, details: &str) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = append_line(path, operation, details) {
            tracing::warn!("Failed to write audit log {:?}: {}", path, e);
        }
    }

    /// Read back every parseable line. A missing file yields no entries.
    pub fn entries(&self) -> StoreResult<Vec<AuditEntry>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            if let Some(entry) = AuditEntry::parse(&line?) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

fn append_line(path: &Path, operation: &str, details: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let timestamp = Local::now().format(TIMESTAMP_FORMAT);
    if details.is_empty() {
        writeln!(file, "[{}] {}", timestamp, operation)
    } else {
        writeln!(file, "[{}] {} {}", timestamp, operation, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_and_read_back() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(Some(dir.path().join("operations.log")));

        log.record("INSERT", "id=1 name=TV");
        log.record("SELL", "id=1 amount=2");
        log.record("BACKUP", "path=b.db");
        log.record("SAVE", "");

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].category, AuditCategory::Add);
        assert_eq!(entries[0].message, "INSERT id=1 name=TV");
        assert_eq!(entries[1].category, AuditCategory::Sell);
        assert_eq!(entries[2].category, AuditCategory::Service);
        assert_eq!(entries[3].category, AuditCategory::Other);
        assert_eq!(entries[3].message, "SAVE");
        assert_eq!(entries[0].timestamp.len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn test_parse_rejects_unbracketed() {
        assert!(AuditEntry::parse("INSERT id=1").is_none());
        assert!(AuditEntry::parse("[unterminated").is_none());
        let entry = AuditEntry::parse("[2024-05-01 10:00:00] DELETE_WHERE supplier=DNS count=1").unwrap();
        assert_eq!(entry.category, AuditCategory::Delete);
    }

    #[test]
    fn test_disabled_and_missing() {
        let log = AuditLog::disabled();
        log.record("INSERT", "id=1");
        assert!(log.entries().unwrap().is_empty());

        let dir = tempdir().unwrap();
        let log = AuditLog::new(Some(dir.path().join("absent.log")));
        assert!(log.entries().unwrap().is_empty());
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending
        let log = AuditLog::new(Some(dir.path().to_path_buf()));
        log.record("INSERT", "id=1");
    }
}
