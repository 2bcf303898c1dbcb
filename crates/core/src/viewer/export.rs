//! Downloadable snapshot of both audit lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::audit::{ErrorEntry, UpdateEntry};

/// `{exportTime, updateLogs, errorLogs}` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogExport {
    pub export_time: DateTime<Utc>,
    pub update_logs: Vec<UpdateEntry>,
    pub error_logs: Vec<ErrorEntry>,
}

impl LogExport {
    pub fn new(update_logs: Vec<UpdateEntry>, error_logs: Vec<ErrorEntry>) -> Self {
        Self { export_time: Utc::now(), update_logs, error_logs }
    }

    /// Suggested file name, stamped with the export time in epoch millis.
    pub fn file_name(&self) -> String {
        format!("update-logs-{}.json", self.export_time.timestamp_millis())
    }

    pub fn to_json_pretty(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidInput(format!("failed to serialize export: {e}")))
    }
}
