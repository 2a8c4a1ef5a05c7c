use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use tandem_core::{config, SyncConfig};
use tandem_sync::{
    CycleReport, IncidentRepository, Orchestrator, SyncError, TicketRepository,
};

use crate::error::{io_err, DaemonError};
use crate::ledger::{self, CycleLedger};
use crate::paths::tandem_root;

/// Build an orchestrator from `<home>/.tandem/config.yaml` and the process
/// environment.
pub fn orchestrator_at<A, B>(
    home: &Path,
    tickets: Arc<A>,
    incidents: Arc<B>,
) -> Result<Orchestrator<A, B>, DaemonError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    let config: SyncConfig = config::load_at(home)?;
    Ok(Orchestrator::new(tickets, incidents, config))
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking<A, B>(home: &Path, orchestrator: Orchestrator<A, B>) -> Result<(), DaemonError>
where
    A: TicketRepository + 'static,
    B: IncidentRepository + 'static,
{
    init_tracing(LogFormat::parse(std::env::var(LOG_FORMAT_VAR).ok().as_deref()));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(async {
        // Kept alive for the whole run; nobody else signals shutdown here.
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);
        let result = run(home.to_path_buf(), Arc::new(orchestrator), shutdown_rx).await;
        drop(shutdown_tx);
        result
    })
}

/// Run one cycle per poll interval until ctrl-c or `shutdown` fires.
///
/// A running cycle is never interrupted; shutdown is observed between
/// cycles. Cycle errors are logged and recorded in the ledger, and the loop
/// keeps going.
pub async fn run<A, B>(
    home: PathBuf,
    orchestrator: Arc<Orchestrator<A, B>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    A: TicketRepository,
    B: IncidentRepository,
{
    ensure_runtime_dirs(&home)?;
    let mut ledger = ledger::load_at(&home)?;
    if let Some(last) = ledger.last_success_at {
        tracing::info!(last_success = %last, "resuming from ledger");
    }

    let poll = orchestrator.config().poll_interval();
    let mut interval = tokio::time::interval(poll);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tracing::info!(
        account = %orchestrator.config().account_id,
        poll_secs = poll.as_secs(),
        "tandem daemon started"
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("shutdown requested");
                break;
            }
            signal = &mut ctrl_c => {
                signal.map_err(|e| DaemonError::Task {
                    task: "signal_handler",
                    reason: e.to_string(),
                })?;
                tracing::info!("received ctrl-c, shutting down daemon");
                break;
            }
            _ = interval.tick() => {
                run_once(&home, &orchestrator, &mut ledger).await;
            }
        }
    }

    Ok(())
}

async fn run_once<A, B>(home: &Path, orchestrator: &Orchestrator<A, B>, ledger: &mut CycleLedger)
where
    A: TicketRepository,
    B: IncidentRepository,
{
    let started_at = Utc::now();
    let outcome = orchestrator.run_cycle_at(started_at).await;
    log_outcome(&outcome, ledger.consecutive_failures);

    let saved = ledger
        .record(started_at, &outcome)
        .and_then(|()| ledger::save_at(home, ledger));
    if let Err(err) = saved {
        tracing::error!(error = %err, "failed to persist cycle ledger");
    }
}

fn log_outcome(outcome: &Result<CycleReport, SyncError>, previous_failures: u32) {
    match outcome {
        Ok(report) => {
            let elapsed = report.finished_at - report.started_at;
            tracing::info!(
                pairs = report.pairs,
                mutations = report.counters.mutations(),
                failures = report.failures.len(),
                anomalies = report.anomalies.len(),
                duration_ms = elapsed.num_milliseconds(),
                "cycle completed",
            );
        }
        Err(SyncError::CycleInProgress) => {
            tracing::warn!("previous cycle still running, tick skipped");
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                kind = ?err.kind(),
                consecutive_failures = previous_failures + 1,
                "cycle failed",
            );
        }
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = tandem_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

/// Selects the log output format.
pub const LOG_FORMAT_VAR: &str = "TANDEM_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else is text.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}
