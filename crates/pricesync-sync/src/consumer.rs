//! Drains the work queue of single-listing refresh requests.
//!
//! A message is acknowledged only after its listing reached a terminal
//! outcome: committed, soft failure, unknown, duplicate, or an unreadable
//! body. Infrastructure failures stop the drain with the in-flight message
//! unacknowledged so the queue redelivers it.
//!
//! Repeats of an identifier inside one receive are acknowledged as
//! duplicates; the same identifier in a later receive is synced again.

use serde::Deserialize;

use crate::error::SyncError;
use crate::orchestrator::SyncOrchestrator;
use crate::outcome::RunSummary;
use crate::ports::{CatalogStore, FallbackSource, PriceSource, WorkQueue};

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    #[serde(default)]
    identifier: Option<String>,
}

/// Extracts the listing identifier from a message body.
///
/// Accepts `{"identifier": "..."}` or a bare identifier token. Anything else
/// yields `None`.
#[must_use]
pub fn parse_identifier(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        let request: RefreshRequest = serde_json::from_str(trimmed).ok()?;
        return request
            .identifier
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty());
    }
    let bare = trimmed.trim_matches('"');
    let valid = !bare.is_empty()
        && bare.len() <= 64
        && bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| bare.to_owned())
}

/// How long to keep polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Stop at the first receive that returns no messages.
    UntilEmpty,
    /// Keep polling until cancelled.
    Forever,
}

/// Long-polls a [`WorkQueue`] and feeds each identifier to the orchestrator.
pub struct QueueConsumer<Q> {
    queue: Q,
    mode: DrainMode,
}

impl<Q: WorkQueue> QueueConsumer<Q> {
    pub fn new(queue: Q, mode: DrainMode) -> Self {
        Self { queue, mode }
    }

    /// Drains the queue through `orchestrator`, opening its fallback
    /// resources once for the whole drain.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Queue`] when a receive or acknowledgement fails
    /// after retries, or [`SyncError::Store`] when the catalog is
    /// unreachable. Either stops the drain.
    pub async fn drain<P, F, S>(
        &self,
        orchestrator: &mut SyncOrchestrator<P, F, S>,
    ) -> Result<RunSummary, SyncError>
    where
        P: PriceSource,
        F: FallbackSource,
        S: CatalogStore,
    {
        let mut summary = RunSummary::default();
        orchestrator.open().await;
        let result = self.poll_loop(orchestrator, &mut summary).await;
        orchestrator.close().await;
        result.map(|()| summary)
    }

    async fn poll_loop<P, F, S>(
        &self,
        orchestrator: &mut SyncOrchestrator<P, F, S>,
        summary: &mut RunSummary,
    ) -> Result<(), SyncError>
    where
        P: PriceSource,
        F: FallbackSource,
        S: CatalogStore,
    {
        loop {
            if orchestrator.is_cancelled() {
                summary.cancelled = true;
                return Ok(());
            }

            let messages = self.queue.receive().await?;
            if messages.is_empty() {
                match self.mode {
                    DrainMode::UntilEmpty => return Ok(()),
                    DrainMode::Forever => continue,
                }
            }
            // Duplicates are collapsed within one receive only. A later
            // request for the same listing is a new job.
            orchestrator.clear_processed();

            for message in messages {
                if orchestrator.is_cancelled() {
                    // Unacknowledged messages reappear after their
                    // visibility timeout.
                    summary.cancelled = true;
                    return Ok(());
                }

                match parse_identifier(&message.body) {
                    Some(id) => {
                        let outcome = orchestrator.sync_one(&id).await?;
                        tracing::debug!(
                            identifier = %id,
                            message_id = %message.message_id,
                            committed = outcome.is_committed(),
                            "queue message processed"
                        );
                        summary.record(&outcome);
                    }
                    None => {
                        tracing::warn!(
                            message_id = %message.message_id,
                            "queue message names no identifier; dropping"
                        );
                        summary.malformed += 1;
                    }
                }
                self.queue.acknowledge(&message.receipt_handle).await?;
            }
        }
    }
}

#[cfg(test)]
#[path = "consumer_test.rs"]
mod tests;
