//! Bounded-concurrency restore of saved terminals.
//!
//! Records are restored in consecutive batches. Every record in a batch is
//! restored concurrently and the whole batch settles before the next one
//! starts; a failed record never aborts its siblings or later batches.
//! Batches are separated by a fixed pacing delay.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use terminal_persist_core::{CompanionKind, RestoreSettings, TerminalId, TerminalSessionRecord};

use crate::manager::{CreateTerminalOptions, TerminalManager};

/// A terminal recreated from a saved record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredTerminal {
    /// ID the record was saved under
    pub previous_id: TerminalId,
    /// ID of the new terminal
    pub terminal_id: TerminalId,
    /// Whether the new terminal was made active
    pub is_active: bool,
}

/// Result of a batch restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Recreated terminals, in input order
    pub restored: Vec<RestoredTerminal>,
    /// Records the manager could not recreate
    pub failed: usize,
    /// Batches started
    pub rounds: usize,
    /// Whether cancellation stopped the restore early
    pub cancelled: bool,
}

impl BatchOutcome {
    /// IDs of the new terminals, in input order.
    pub fn terminal_ids(&self) -> Vec<TerminalId> {
        self.restored.iter().map(|r| r.terminal_id.clone()).collect()
    }
}

/// Synthetic commands announcing a companion session continuation.
pub fn companion_notice(kind: CompanionKind) -> Vec<String> {
    let mut lines = vec![format!("echo '[{} session restored]'", kind.label())];
    if let Some(command) = kind.resume_command() {
        lines.push(format!("echo 'Run \"{command}\" to pick up where you left off'"));
    }
    lines
}

/// Restores saved terminals through a [`TerminalManager`].
#[derive(Debug, Clone)]
pub struct BatchRestorer {
    manager: Arc<dyn TerminalManager>,
    batch_size: usize,
    pacing: Duration,
    companion_notice: bool,
}

impl BatchRestorer {
    /// Create a restorer from settings.
    pub fn new(manager: Arc<dyn TerminalManager>, settings: &RestoreSettings) -> Self {
        Self {
            manager,
            batch_size: settings.batch_size.max(1),
            pacing: settings.batch_pacing(),
            companion_notice: settings.companion_notice,
        }
    }

    /// Records restored concurrently per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Restore `records` in order.
    ///
    /// The first successfully restored record marked active becomes the
    /// active terminal. Cancellation is observed between batches.
    pub async fn restore(
        &self,
        records: &[TerminalSessionRecord],
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut active_assigned = false;

        for (round, batch) in records.chunks(self.batch_size).enumerate() {
            if round > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        outcome.cancelled = true;
                    }
                    _ = tokio::time::sleep(self.pacing) => {}
                }
            } else if cancel.is_cancelled() {
                outcome.cancelled = true;
            }
            if outcome.cancelled {
                warn!(
                    "Batch restore cancelled after {} round(s), {} terminal(s) restored",
                    outcome.rounds,
                    outcome.restored.len()
                );
                break;
            }

            debug!("Restoring batch {} ({} record(s))", round + 1, batch.len());
            let created = join_all(batch.iter().map(|record| self.restore_one(record))).await;
            outcome.rounds += 1;

            for (record, terminal_id) in batch.iter().zip(created) {
                let Some(terminal_id) = terminal_id else {
                    outcome.failed += 1;
                    continue;
                };

                let is_active = record.is_active && !active_assigned;
                if is_active {
                    self.manager.set_active_terminal(&terminal_id).await;
                    active_assigned = true;
                } else if record.is_active {
                    warn!(
                        "Ignoring duplicate active record {}; {} is already active",
                        record.id,
                        outcome
                            .restored
                            .iter()
                            .find(|r| r.is_active)
                            .map(|r| r.terminal_id.as_str())
                            .unwrap_or("another terminal")
                    );
                }

                outcome.restored.push(RestoredTerminal {
                    previous_id: record.id.clone(),
                    terminal_id,
                    is_active,
                });
            }
        }

        info!(
            "Batch restore finished: restored={}, failed={}, rounds={}",
            outcome.restored.len(),
            outcome.failed,
            outcome.rounds
        );
        outcome
    }

    async fn restore_one(&self, record: &TerminalSessionRecord) -> Option<TerminalId> {
        let Some(terminal_id) = self
            .manager
            .create_terminal(CreateTerminalOptions::from_record(record))
            .await
        else {
            warn!(
                "Terminal manager did not create a terminal for record {} ({})",
                record.id, record.name
            );
            return None;
        };

        if let (Some(kind), true) = (record.companion_process_type, self.companion_notice) {
            for line in companion_notice(kind) {
                if let Err(e) = self
                    .manager
                    .send_input(&terminal_id, &format!("{line}\r"))
                    .await
                {
                    warn!("Failed to replay companion notice into {}: {}", terminal_id, e);
                    break;
                }
            }
        }

        debug!("Restored record {} as {}", record.id, terminal_id);
        Some(terminal_id)
    }
}
