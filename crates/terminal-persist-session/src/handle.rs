//! Handle for talking to a running persistence service.
//!
//! [`PersistenceService::spawn`] moves the service onto its own task and
//! returns a [`PersistenceHandle`]. Commands are processed one at a time, so
//! a save never interleaves with a restore.

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use terminal_persist_core::{
    CleanupResult, PersistenceResult, RestoreResult, Result, SessionStats, SessionSummary,
};

use crate::events::PersistenceEvent;
use crate::persistence::PersistenceService;

const COMMAND_BUFFER: usize = 32;

type CallResult<T> = std::result::Result<T, ServiceClosed>;

/// The service task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("persistence service has shut down")]
pub struct ServiceClosed;

enum Command {
    Save {
        cancel: CancellationToken,
        reply: oneshot::Sender<PersistenceResult>,
    },
    Restore {
        force_restore: bool,
        cancel: CancellationToken,
        reply: oneshot::Sender<RestoreResult>,
    },
    Info {
        reply: oneshot::Sender<Result<Option<SessionSummary>>>,
    },
    Stats {
        reply: oneshot::Sender<Result<SessionStats>>,
    },
    Clear {
        reply: oneshot::Sender<PersistenceResult>,
    },
    Cleanup {
        reply: oneshot::Sender<CleanupResult>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cheap-to-clone handle to a spawned [`PersistenceService`].
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<PersistenceEvent>,
}

impl PersistenceHandle {
    async fn call<T>(&self, command: Command, reply: oneshot::Receiver<T>) -> CallResult<T> {
        self.tx.send(command).await.map_err(|_| ServiceClosed)?;
        reply.await.map_err(|_| ServiceClosed)
    }

    /// Subscribe to status notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent> {
        self.events.subscribe()
    }

    /// Whether the service task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Save the live terminals.
    pub async fn save_current_session(&self) -> CallResult<PersistenceResult> {
        self.save_current_session_with(CancellationToken::new()).await
    }

    /// Save the live terminals, abandoning the save when `cancel` fires.
    pub async fn save_current_session_with(
        &self,
        cancel: CancellationToken,
    ) -> CallResult<PersistenceResult> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Save { cancel, reply }, rx).await
    }

    /// Restore the saved session.
    pub async fn restore_session(&self, force_restore: bool) -> CallResult<RestoreResult> {
        self.restore_session_with(force_restore, CancellationToken::new())
            .await
    }

    /// Restore the saved session, stopping when `cancel` fires.
    pub async fn restore_session_with(
        &self,
        force_restore: bool,
        cancel: CancellationToken,
    ) -> CallResult<RestoreResult> {
        let (reply, rx) = oneshot::channel();
        self.call(
            Command::Restore {
                force_restore,
                cancel,
                reply,
            },
            rx,
        )
        .await
    }

    /// Summary of the stored session.
    pub async fn session_info(&self) -> CallResult<Result<Option<SessionSummary>>> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Info { reply }, rx).await
    }

    /// Statistics over the stored session.
    pub async fn session_stats(&self) -> CallResult<Result<SessionStats>> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Stats { reply }, rx).await
    }

    /// Delete the stored session.
    pub async fn clear_session(&self) -> CallResult<PersistenceResult> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Clear { reply }, rx).await
    }

    /// Delete the stored session if it has expired.
    pub async fn cleanup_expired_sessions(&self) -> CallResult<CleanupResult> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Cleanup { reply }, rx).await
    }

    /// Stop the service after the command in progress completes.
    pub async fn shutdown(&self) -> CallResult<()> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Shutdown { reply }, rx).await
    }
}

impl PersistenceService {
    /// Move the service onto its own task.
    pub fn spawn(self) -> (PersistenceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = PersistenceHandle {
            tx,
            events: self.event_sender(),
        };
        let task = tokio::spawn(run(self, rx));
        (handle, task)
    }
}

async fn run(mut service: PersistenceService, mut rx: mpsc::Receiver<Command>) {
    debug!("Persistence service started");
    while let Some(command) = rx.recv().await {
        match command {
            Command::Save { cancel, reply } => {
                let result = service.save_current_session(&cancel).await;
                let _ = reply.send(result);
            }
            Command::Restore {
                force_restore,
                cancel,
                reply,
            } => {
                let result = service.restore_session(force_restore, &cancel).await;
                let _ = reply.send(result);
            }
            Command::Info { reply } => {
                let _ = reply.send(service.session_info().await);
            }
            Command::Stats { reply } => {
                let _ = reply.send(service.session_stats().await);
            }
            Command::Clear { reply } => {
                let _ = reply.send(service.clear_session().await);
            }
            Command::Cleanup { reply } => {
                let _ = reply.send(service.cleanup_expired_sessions().await);
            }
            Command::Shutdown { reply } => {
                info!("Persistence service shutting down");
                let _ = reply.send(());
                break;
            }
        }
    }
    debug!("Persistence service stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::watch;

    use terminal_persist_core::PersistenceSettings;
    use terminal_persist_storage::MemoryStore;
    use terminal_persist_surface::SerializationChannel;

    use crate::testing::ScriptedTerminalManager;

    fn spawn(manager: Arc<ScriptedTerminalManager>) -> (PersistenceHandle, JoinHandle<()>) {
        let (_tx, rx) = watch::channel(PersistenceSettings::default());
        PersistenceService::new(
            manager,
            Arc::new(MemoryStore::new()),
            Arc::new(SerializationChannel::default()),
            rx,
        )
        .spawn()
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let manager = Arc::new(ScriptedTerminalManager::new());
        manager.open("build", "cargo build").await;
        let (handle, _task) = spawn(manager);

        let saved = handle.save_current_session().await.unwrap();
        assert_eq!(saved.terminal_count, 1);

        let info = handle.session_info().await.unwrap().unwrap().unwrap();
        assert_eq!(info.terminal_count(), 1);

        let cleared = handle.clear_session().await.unwrap();
        assert!(cleared.success);
        assert!(handle.session_info().await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (handle, task) = spawn(Arc::new(ScriptedTerminalManager::new()));
        let other = handle.clone();

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(!other.is_running());
        assert_eq!(other.clear_session().await, Err(ServiceClosed));
    }

    #[tokio::test]
    async fn test_events_reach_handle_subscribers() {
        let manager = Arc::new(ScriptedTerminalManager::new());
        manager.open("a", "1").await;
        let (handle, _task) = spawn(manager);
        let mut events = handle.subscribe();

        handle.save_current_session().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            PersistenceEvent::SessionSaved { .. }
        ));
    }
}
