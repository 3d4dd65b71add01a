//! The persistence service: saves live terminals into a session envelope and
//! restores them later.
//!
//! A [`PersistenceService`] is owned by exactly one task (see
//! [`crate::handle`]); its operations take `&mut self` and never overlap.
//! Every operation returns a typed result instead of an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use terminal_persist_core::{
    CleanupResult, Error, PersistenceResult, PersistenceSettings, RestoreResult, RestoreTerminal,
    Result, ScrollbackSource, SessionEnvelope, SessionInfoTerminal, SessionStats, SessionSummary,
    SurfaceMessage, TerminalId, TerminalSessionRecord,
};
use terminal_persist_storage::{optimize_scrollback, split_lines, KeyValueStore, SessionStore};
use terminal_persist_surface::SerializationChannel;

use crate::batch::{BatchOutcome, BatchRestorer};
use crate::events::PersistenceEvent;
use crate::manager::{DeleteOptions, ScrollbackOptions, TerminalInfo, TerminalManager};

const EVENT_CAPACITY: usize = 64;

/// Session persistence for one storage scope.
#[derive(Debug)]
pub struct PersistenceService {
    manager: Arc<dyn TerminalManager>,
    store: SessionStore,
    channel: Arc<SerializationChannel>,
    settings: watch::Receiver<PersistenceSettings>,
    events: broadcast::Sender<PersistenceEvent>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl PersistenceService {
    /// Create a service.
    ///
    /// Storage scope, size ceiling and codec are taken from the settings
    /// current at construction; every other section is re-read on each
    /// operation.
    pub fn new(
        manager: Arc<dyn TerminalManager>,
        backend: Arc<dyn KeyValueStore>,
        channel: Arc<SerializationChannel>,
        settings: watch::Receiver<PersistenceSettings>,
    ) -> Self {
        let store = SessionStore::from_settings(backend, &settings.borrow());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            manager,
            store,
            channel,
            settings,
            events,
            last_timestamp: None,
        }
    }

    /// The underlying session store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The serialization channel to the surface.
    pub fn channel(&self) -> &Arc<SerializationChannel> {
        &self.channel
    }

    /// Subscribe to status notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<PersistenceEvent> {
        self.events.clone()
    }

    fn settings(&self) -> PersistenceSettings {
        self.settings.borrow().clone()
    }

    fn emit(&self, event: PersistenceEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn fail(&self, operation: &'static str, error: Error) -> Error {
        error!("{} failed: {}", operation, error);
        self.emit(PersistenceEvent::OperationFailed {
            operation,
            error: error.clone(),
        });
        error
    }

    /// Envelope timestamps strictly increase across saves.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_timestamp {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }

    /// Start stamping after the stored envelope, which may come from an
    /// earlier process whose clock ran ahead.
    async fn seed_timestamp_floor(&mut self) {
        match self.store.load().await {
            Ok(Some(previous)) => self.last_timestamp = Some(previous.timestamp),
            Ok(None) => {}
            Err(e) => debug!("Ignoring unreadable previous session: {}", e),
        }
    }

    // ------------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------------

    /// Save the live terminals.
    #[instrument(skip_all)]
    pub async fn save_current_session(&mut self, cancel: &CancellationToken) -> PersistenceResult {
        let settings = self.settings();
        if !settings.session.enable_persistent_sessions {
            debug!("Persistent sessions disabled; skipping save");
            return PersistenceResult::empty();
        }
        if cancel.is_cancelled() {
            return PersistenceResult::failed(Error::OperationCancelled("save".to_string()));
        }

        let terminals = self.manager.terminals().await;
        if terminals.is_empty() {
            debug!("No live terminals; nothing to save");
            return PersistenceResult::empty();
        }

        let active = match self.manager.active_terminal_id().await {
            Some(id) => Some(id),
            None => terminals.iter().find(|t| t.is_active).map(|t| t.id.clone()),
        };

        let limit = settings.session.persistent_session_scrollback;
        let records = match settings.session.scrollback_source {
            ScrollbackSource::TerminalManager => {
                self.records_from_manager(terminals, active.as_ref(), limit).await
            }
            ScrollbackSource::Surface => {
                match self
                    .records_from_surface(terminals, active.as_ref(), limit, cancel)
                    .await
                {
                    Ok(records) => records,
                    Err(e) => return PersistenceResult::failed(self.fail("save", e)),
                }
            }
        };

        if cancel.is_cancelled() {
            return PersistenceResult::failed(Error::OperationCancelled("save".to_string()));
        }

        if self.last_timestamp.is_none() {
            self.seed_timestamp_floor().await;
        }
        let timestamp = self.next_timestamp();
        let envelope = SessionEnvelope::new(
            records,
            active,
            settings.session.envelope_config(),
            timestamp,
        );
        let count = envelope.terminals.len();

        match self.store.save(&envelope).await {
            Ok(bytes) => {
                info!("Saved session: terminals={}, bytes={}", count, bytes);
                self.emit(PersistenceEvent::SessionSaved {
                    terminal_count: count,
                    bytes,
                });
                self.announce(&envelope);
                PersistenceResult::saved(count)
            }
            Err(e) => PersistenceResult::failed(self.fail("save", e)),
        }
    }

    async fn records_from_manager(
        &self,
        terminals: Vec<TerminalInfo>,
        active: Option<&TerminalId>,
        limit: usize,
    ) -> Vec<TerminalSessionRecord> {
        let mut records = Vec::with_capacity(terminals.len());
        for info in terminals {
            let scrollback = self
                .manager
                .scrollback_data(
                    &info.id,
                    ScrollbackOptions {
                        scrollback: Some(limit),
                    },
                )
                .await
                .map(|text| optimize_scrollback(split_lines(&text), limit));
            let is_active = active == Some(&info.id);
            records.push(info.into_record(is_active, scrollback));
        }
        records
    }

    async fn records_from_surface(
        &self,
        terminals: Vec<TerminalInfo>,
        active: Option<&TerminalId>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<TerminalSessionRecord>> {
        let ids = terminals.iter().map(|t| t.id.clone()).collect();
        let payload = self.channel.request_serialization(ids, cancel).await?;

        let mut records = Vec::with_capacity(terminals.len());
        for info in terminals {
            let scrollback = match payload.get(&info.id) {
                Some(entry) => {
                    let content = self.store.codec().decode_terminal(entry)?;
                    Some(optimize_scrollback(split_lines(&content), limit))
                }
                None => {
                    warn!("Surface returned no content for terminal {}", info.id);
                    None
                }
            };
            let is_active = active == Some(&info.id);
            records.push(info.into_record(is_active, scrollback));
        }
        Ok(records)
    }

    fn announce(&self, envelope: &SessionEnvelope) {
        if !self.channel.is_attached() {
            return;
        }
        let message = SurfaceMessage::SessionInfo {
            terminals: envelope
                .terminals
                .iter()
                .map(|t| SessionInfoTerminal {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    ordinal_number: t.ordinal_number,
                    is_active: t.is_active,
                })
                .collect(),
            active_terminal_id: envelope.active_terminal_id.clone(),
            config: envelope.config,
            timestamp: envelope.timestamp,
        };
        if let Err(e) = self.channel.send(message) {
            debug!("Session info not delivered: {}", e);
        }
    }

    // ------------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------------

    /// Restore the saved session.
    ///
    /// With live terminals present the restore is skipped unless
    /// `force_restore` is set, in which case the live terminals are deleted
    /// first.
    #[instrument(skip(self, cancel))]
    pub async fn restore_session(
        &mut self,
        force_restore: bool,
        cancel: &CancellationToken,
    ) -> RestoreResult {
        let settings = self.settings();

        // Config gate
        if !settings.session.enable_persistent_sessions {
            debug!("Persistent sessions disabled; skipping restore");
            return RestoreResult::noop();
        }
        if cancel.is_cancelled() {
            return RestoreResult::failed(Error::OperationCancelled("restore".to_string()));
        }

        // Envelope lookup
        let envelope = match self.store.load().await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!("No saved session to restore");
                return RestoreResult::noop();
            }
            Err(e) => return RestoreResult::failed(self.fail("restore", e)),
        };

        // Expiry gate
        if envelope.is_expired_at(Utc::now(), settings.session.max_age()) {
            info!(
                "Saved session from {} is older than {} day(s); purging",
                envelope.timestamp, settings.session.max_age_days
            );
            if let Err(e) = self.store.clear().await {
                warn!("Failed to purge expired session: {}", e);
            } else {
                self.emit(PersistenceEvent::SessionExpired);
            }
            return RestoreResult::noop();
        }

        // Conflict gate
        let live = self.manager.terminals().await;
        if !live.is_empty() {
            if !force_restore {
                info!(
                    "{} live terminal(s) present; skipping restore of {} saved terminal(s)",
                    live.len(),
                    envelope.terminals.len()
                );
                return RestoreResult::skipped(envelope.terminals.len());
            }

            // Cleanup
            info!("Force restore: deleting {} live terminal(s)", live.len());
            for terminal in &live {
                let outcome = self
                    .manager
                    .delete_terminal(&terminal.id, DeleteOptions { force: true })
                    .await;
                if !outcome.success {
                    warn!(
                        "Failed to delete terminal {}: {}",
                        terminal.id,
                        outcome.reason.as_deref().unwrap_or("unknown reason")
                    );
                }
            }
        }

        // Batch restore
        let restorer = BatchRestorer::new(Arc::clone(&self.manager), &settings.restore);
        let outcome = restorer.restore(&envelope.terminals, cancel).await;
        let restored = outcome.restored.len();
        let skipped = envelope.terminals.len() - restored;

        if outcome.cancelled {
            return RestoreResult::interrupted(
                restored,
                skipped,
                Error::OperationCancelled("restore".to_string()),
            );
        }

        let mut result = RestoreResult::completed(restored, skipped);
        if restored > 0 {
            // Push content
            match self.push_content(&envelope, &outcome) {
                Ok(()) => {
                    // Settle
                    let delay = settings.restore.settle_delay(restored);
                    debug!("Waiting {:?} for the surface to settle", delay);
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return RestoreResult::interrupted(
                                restored,
                                skipped,
                                Error::OperationCancelled("restore settle".to_string()),
                            );
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!("Restored terminals without content: {}", e);
                    result = result.with_error(e);
                }
            }
        }

        info!(
            "Restore finished: restored={}, skipped={}",
            result.restored_count, result.skipped_count
        );
        self.emit(PersistenceEvent::SessionRestored {
            restored_count: result.restored_count,
            skipped_count: result.skipped_count,
        });
        result
    }

    fn push_content(&self, envelope: &SessionEnvelope, outcome: &BatchOutcome) -> Result<()> {
        let terminals = outcome
            .restored
            .iter()
            .filter_map(|restored| {
                let record = envelope
                    .terminals
                    .iter()
                    .find(|r| r.id == restored.previous_id)?;
                Some(RestoreTerminal {
                    id: restored.terminal_id.clone(),
                    name: record.name.clone(),
                    is_active: restored.is_active,
                    scrollback: record.scrollback.clone().unwrap_or_default(),
                })
            })
            .collect();

        self.channel.send(SurfaceMessage::RestoreContent {
            terminals,
            timestamp: Utc::now(),
        })
    }

    // ------------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------------

    /// Summary of the stored envelope. Never purges.
    #[instrument(skip_all)]
    pub async fn session_info(&self) -> Result<Option<SessionSummary>> {
        let settings = self.settings();
        let envelope = self.store.load().await?;
        Ok(envelope
            .map(|e| SessionSummary::from_envelope(&e, Utc::now(), settings.session.max_age())))
    }

    /// Statistics over the stored envelope and current settings. Never purges.
    #[instrument(skip_all)]
    pub async fn session_stats(&self) -> Result<SessionStats> {
        let settings = self.settings();
        let envelope = self.store.load().await?;
        Ok(SessionStats::collect(
            envelope.as_ref(),
            &settings.session,
            Utc::now(),
        ))
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    /// Delete the stored envelope. Idempotent.
    #[instrument(skip_all)]
    pub async fn clear_session(&self) -> PersistenceResult {
        match self.store.clear().await {
            Ok(()) => {
                info!("Cleared saved session");
                self.emit(PersistenceEvent::SessionCleared);
                PersistenceResult::empty()
            }
            Err(e) => PersistenceResult::failed(self.fail("clear", e)),
        }
    }

    /// Delete the stored envelope if it is expired. Idempotent.
    #[instrument(skip_all)]
    pub async fn cleanup_expired_sessions(&self) -> CleanupResult {
        let settings = self.settings();
        let envelope = match self.store.load().await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return CleanupResult::done(false),
            Err(e) => return CleanupResult::failed(self.fail("cleanup", e)),
        };

        if !envelope.is_expired_at(Utc::now(), settings.session.max_age()) {
            return CleanupResult::done(false);
        }

        match self.store.clear().await {
            Ok(()) => {
                info!("Purged expired session from {}", envelope.timestamp);
                self.emit(PersistenceEvent::SessionExpired);
                CleanupResult::done(true)
            }
            Err(e) => CleanupResult::failed(self.fail("cleanup", e)),
        }
    }
}
