//! Store configuration

use std::path::PathBuf;

use serde::Deserialize;

/// Default capacity of the change-event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default quantity below which a product counts as low stock
pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

/// Configuration for a [`RecordStore`](crate::RecordStore)
///
/// The audit log path is used both by the store when writing and by
/// [`AuditLog::entries`](crate::audit::AuditLog::entries) when reading back.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the binary data file
    pub data_file: PathBuf,
    /// Path of the human-readable audit trail, `None` disables it
    pub audit_log: Option<PathBuf>,
    /// Capacity of the change-event broadcast channel
    pub event_capacity: usize,
    /// Threshold used by low-stock aggregates
    pub low_stock_threshold: i32,
}

impl StoreConfig {
    /// Create a config for the given data file with default settings
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        StoreConfig {
            data_file: data_file.into(),
            ..Default::default()
        }
    }

    /// Set the audit log path
    pub fn with_audit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log = Some(path.into());
        self
    }

    /// Disable the audit trail
    pub fn without_audit_log(mut self) -> Self {
        self.audit_log = None;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_file: PathBuf::from("inventory.db"),
            audit_log: Some(PathBuf::from("operations.log")),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }
}
