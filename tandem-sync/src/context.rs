//! Shared per-cycle context: repositories, config, and the call guard.

use std::future::Future;
use std::time::Duration;

use tandem_core::{MirrorMap, SyncConfig, System, TicketField, TicketId};

use crate::error::{RepoError, SyncError};
use crate::repo::TicketRepository;

/// Run one remote call under the configured timeout.
pub(crate) async fn guarded<T, F>(
    system: System,
    op: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, RepoError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(SyncError::Remote { system, op, source }),
        Err(_) => {
            tracing::warn!("{system} {op} timed out after {limit:?}");
            Err(SyncError::Timeout {
                system,
                op,
                after: limit,
            })
        }
    }
}

/// Borrowed view of everything a phase needs.
pub(crate) struct Ctx<'a, A, B> {
    pub tickets: &'a A,
    pub incidents: &'a B,
    pub config: &'a SyncConfig,
}

impl<'a, A, B> Ctx<'a, A, B> {
    pub fn new(tickets: &'a A, incidents: &'a B, config: &'a SyncConfig) -> Self {
        Self {
            tickets,
            incidents,
            config,
        }
    }

    pub async fn on_a<T, F>(&self, op: &'static str, call: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, RepoError>>,
    {
        guarded(System::A, op, self.config.call_timeout(), call).await
    }

    pub async fn on_b<T, F>(&self, op: &'static str, call: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, RepoError>>,
    {
        guarded(System::B, op, self.config.call_timeout(), call).await
    }
}

impl<A: TicketRepository, B> Ctx<'_, A, B> {
    /// Write a mirror map unless it equals what was last stored.
    pub async fn persist_map(
        &self,
        ticket: &TicketId,
        field: TicketField,
        map: &MirrorMap,
        persisted: &mut MirrorMap,
    ) -> Result<(), SyncError> {
        if map == persisted {
            return Ok(());
        }
        self.on_a(
            "update_extension",
            self.tickets.update_extension(ticket, field, map.encode()),
        )
        .await?;
        *persisted = map.clone();
        Ok(())
    }
}

/// Cut `text` to at most `limit` characters, never inside a code point.
pub(crate) fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_owned(),
        None => text.to_owned(),
    }
}
