//! Polling runner for the tandem bridge: one reconciliation cycle per
//! interval, a persisted cycle ledger, ctrl-c shutdown.

mod error;
pub mod ledger;
pub mod paths;
mod runtime;

pub use error::DaemonError;
pub use ledger::CycleLedger;
pub use runtime::{orchestrator_at, run, start_blocking, LogFormat, LOG_FORMAT_VAR};
