//! Surface-side message endpoint.
//!
//! Serves [`SurfaceMessage`]s against a [`CacheManager`] and answers
//! serialization requests with [`HostMessage`]s.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use terminal_persist_core::{Error, HostMessage, SessionInfoTerminal, SurfaceMessage, TerminalId};

use crate::cache::{CacheManager, RestoreOptions, SerializeOptions};
use crate::channel::SerializationChannel;

/// Last session snapshot announced by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncedSession {
    /// Saved terminals
    pub terminals: Vec<SessionInfoTerminal>,
    /// Active terminal
    pub active_terminal_id: Option<TerminalId>,
}

/// Serves the host protocol on the rendering surface.
#[derive(Debug, Clone)]
pub struct SurfaceEndpoint {
    cache: Arc<CacheManager>,
    serialize_options: SerializeOptions,
    announced: Arc<Mutex<Option<AnnouncedSession>>>,
}

impl SurfaceEndpoint {
    /// Create an endpoint over `cache`.
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            cache,
            serialize_options: SerializeOptions::default(),
            announced: Arc::default(),
        }
    }

    /// Options applied to every serialization request.
    pub fn with_serialize_options(mut self, options: SerializeOptions) -> Self {
        self.serialize_options = options;
        self
    }

    /// The cache this endpoint serves.
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Last `sessionInfo` received.
    pub fn announced_session(&self) -> Option<AnnouncedSession> {
        self.announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handle one message. Returns the reply, if the message expects one.
    pub async fn handle(&self, message: SurfaceMessage) -> Option<HostMessage> {
        match message {
            SurfaceMessage::RequestSerialization {
                request_id,
                terminal_ids,
                ..
            } => {
                debug!(
                    "Serialization requested: request_id={}, terminals={}",
                    request_id,
                    terminal_ids.len()
                );
                match self
                    .cache
                    .serialize_many(&terminal_ids, self.serialize_options)
                    .await
                {
                    Ok(payload) => Some(HostMessage::SerializationResponse {
                        request_id,
                        payload,
                    }),
                    Err(e) => {
                        // No response; the host times out
                        warn!("Failed to serialize terminals for {}: {}", request_id, e);
                        None
                    }
                }
            }

            SurfaceMessage::RestoreContent { terminals, .. } => {
                info!("Restoring content into {} terminal(s)", terminals.len());
                for terminal in terminals {
                    match self
                        .cache
                        .restore_content(&terminal.id, &terminal.scrollback, RestoreOptions::default())
                        .await
                    {
                        Ok(lines) => debug!("Restored {} line(s) into {}", lines, terminal.id),
                        Err(Error::TerminalNotFound(_)) => {
                            warn!("Restore target {} is not on this surface", terminal.id)
                        }
                        Err(e) => warn!("Failed to restore {}: {}", terminal.id, e),
                    }
                }
                None
            }

            SurfaceMessage::SessionInfo {
                terminals,
                active_terminal_id,
                ..
            } => {
                debug!("Session info received: {} terminal(s)", terminals.len());
                *self
                    .announced
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(AnnouncedSession {
                    terminals,
                    active_terminal_id,
                });
                None
            }
        }
    }

    /// Serve messages until the inbound side closes or `cancel` fires.
    pub async fn run(
        self,
        mut inbound: mpsc::UnboundedReceiver<SurfaceMessage>,
        outbound: mpsc::UnboundedSender<HostMessage>,
        cancel: CancellationToken,
    ) {
        info!("Surface endpoint running");
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            if let Some(reply) = self.handle(message).await {
                if outbound.send(reply).is_err() {
                    warn!("Host went away; stopping surface endpoint");
                    break;
                }
            }
        }
        info!("Surface endpoint stopped");
    }
}

/// An in-process connection between a [`SerializationChannel`] and a
/// [`SurfaceEndpoint`].
#[derive(Debug)]
pub struct SurfaceLink {
    channel: Arc<SerializationChannel>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SurfaceLink {
    /// Attach `endpoint` to `channel` and start serving.
    pub fn connect(channel: Arc<SerializationChannel>, endpoint: SurfaceEndpoint) -> Self {
        let (to_surface, surface_rx) = mpsc::unbounded_channel();
        let (to_host, host_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        channel.attach(to_surface);

        let serve = tokio::spawn(endpoint.run(surface_rx, to_host, cancel.child_token()));
        let pump = {
            let channel = Arc::clone(&channel);
            let cancel = cancel.child_token();
            tokio::spawn(async move { channel.pump_responses(host_rx, cancel).await })
        };

        Self {
            channel,
            cancel,
            tasks: vec![serve, pump],
        }
    }

    /// Detach the channel and stop both tasks.
    pub async fn disconnect(mut self) {
        self.channel.detach();
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for SurfaceLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
