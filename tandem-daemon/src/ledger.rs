//! Cycle ledger: what the daemon remembers between cycles and restarts.
//!
//! Persisted as `<home>/.tandem/ledger.json`, written with the atomic
//! `.tmp` + rename pattern. A missing file loads as an empty ledger.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tandem_sync::{CycleReport, SyncError};

use crate::error::{io_err, DaemonError};
use crate::paths::ledger_path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleLedger {
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Start of the last cycle that completed; the next lookback is safe
    /// from here.
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub total_cycles: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// The last successful [`CycleReport`], as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<serde_json::Value>,
}

impl CycleLedger {
    /// Fold the outcome of a cycle that started at `started_at`.
    pub fn record(
        &mut self,
        started_at: DateTime<Utc>,
        outcome: &Result<CycleReport, SyncError>,
    ) -> Result<(), DaemonError> {
        self.last_cycle_at = Some(started_at);
        self.total_cycles += 1;
        match outcome {
            Ok(report) => {
                self.last_success_at = Some(report.started_at);
                self.consecutive_failures = 0;
                self.last_error = None;
                self.last_report = Some(serde_json::to_value(report)?);
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.last_error = Some(e.to_string());
            }
        }
        Ok(())
    }
}

pub fn load_at(home: &Path) -> Result<CycleLedger, DaemonError> {
    let path = ledger_path(home);
    if !path.exists() {
        return Ok(CycleLedger::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(CycleLedger::default());
    }
    Ok(serde_json::from_str(&contents)?)
}

/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(home: &Path, ledger: &CycleLedger) -> Result<(), DaemonError> {
    let path = ledger_path(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid ledger path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(ledger)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}
