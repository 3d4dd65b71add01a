//! Host-side request/response channel to the rendering surface.
//!
//! The channel holds at most one pending serialization request. A response
//! resolves it only when its `requestId` matches; anything else, including a
//! response that arrives after the request timed out, is dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use terminal_persist_core::{
    Error, HostMessage, Result, SerializationPayload, SurfaceMessage, SurfaceSettings, TerminalId,
};

/// Sender half used to reach an attached surface.
pub type SurfaceSender = mpsc::UnboundedSender<SurfaceMessage>;

#[derive(Debug)]
struct Pending {
    request_id: Uuid,
    reply: oneshot::Sender<SerializationPayload>,
}

#[derive(Debug, Default)]
struct ChannelState {
    outbound: Option<SurfaceSender>,
    pending: Option<Pending>,
}

/// Single-slot correlator for serialization round trips.
#[derive(Debug)]
pub struct SerializationChannel {
    state: Mutex<ChannelState>,
    timeout: Duration,
}

impl SerializationChannel {
    /// Default round-trip timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a detached channel with the given timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(ChannelState::default()),
            timeout,
        }
    }

    /// Create a detached channel from configuration.
    pub fn from_settings(settings: &SurfaceSettings) -> Self {
        Self::new(settings.channel_timeout())
    }

    /// Round-trip timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attach a surface. Replaces any previous one.
    pub fn attach(&self, outbound: SurfaceSender) {
        let mut state = self.lock();
        state.outbound = Some(outbound);
        info!("Rendering surface attached");
    }

    /// Detach the surface. A pending request fails immediately.
    pub fn detach(&self) {
        let mut state = self.lock();
        state.outbound = None;
        if state.pending.take().is_some() {
            debug!("Dropped pending serialization request on detach");
        }
        info!("Rendering surface detached");
    }

    /// Whether a surface is attached.
    pub fn is_attached(&self) -> bool {
        self.lock()
            .outbound
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Whether a serialization request is in flight.
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Send a fire-and-forget message to the surface.
    pub fn send(&self, message: SurfaceMessage) -> Result<()> {
        let mut state = self.lock();
        Self::deliver(&mut state, message)
    }

    /// Ask the surface to serialize `terminal_ids` and wait for the answer.
    ///
    /// Fails with `SurfaceCommunicationFailed` when detached, when another
    /// request is in flight, or after the timeout elapses; the slot is
    /// cleared in every case.
    pub async fn request_serialization(
        &self,
        terminal_ids: Vec<TerminalId>,
        cancel: &CancellationToken,
    ) -> Result<SerializationPayload> {
        let request_id = Uuid::new_v4();
        let (reply, rx) = oneshot::channel();

        {
            let mut state = self.lock();
            if state.pending.is_some() {
                return Err(Error::SurfaceCommunicationFailed(
                    "a serialization request is already in flight".to_string(),
                ));
            }
            let count = terminal_ids.len();
            Self::deliver(
                &mut state,
                SurfaceMessage::RequestSerialization {
                    request_id,
                    terminal_ids,
                    timestamp: Utc::now(),
                },
            )?;
            state.pending = Some(Pending { request_id, reply });
            debug!(
                "Requested serialization of {} terminal(s): request_id={}",
                count, request_id
            );
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(Error::OperationCancelled(
                "serialization request cancelled".to_string(),
            )),
            received = tokio::time::timeout(self.timeout, rx) => match received {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(_)) => Err(Error::SurfaceCommunicationFailed(
                    "surface detached before responding".to_string(),
                )),
                Err(_) => Err(Error::SurfaceCommunicationFailed(format!(
                    "no serialization response within {:?}",
                    self.timeout
                ))),
            },
        };

        if outcome.is_err() {
            self.clear_pending(request_id);
        }
        if let Err(e) = &outcome {
            warn!("Serialization request {} failed: {}", request_id, e);
        }
        outcome
    }

    /// Feed a message from the surface. Returns whether it resolved the
    /// pending request.
    pub fn handle_response(&self, message: HostMessage) -> bool {
        let HostMessage::SerializationResponse {
            request_id,
            payload,
        } = message;

        let mut state = self.lock();
        match state.pending.take() {
            Some(pending) if pending.request_id == request_id => {
                debug!(
                    "Serialization response received: request_id={}, terminals={}",
                    request_id,
                    payload.len()
                );
                // The waiter may have given up in the meantime
                pending.reply.send(payload).is_ok()
            }
            other => {
                state.pending = other;
                debug!("Dropping unmatched serialization response: request_id={}", request_id);
                false
            }
        }
    }

    /// Route surface messages into [`SerializationChannel::handle_response`]
    /// until the sender closes or `cancel` fires.
    pub async fn pump_responses(
        &self,
        mut inbound: mpsc::UnboundedReceiver<HostMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => {
                        self.handle_response(message);
                    }
                    None => break,
                },
            }
        }
        debug!("Surface response pump stopped");
    }

    fn deliver(state: &mut ChannelState, message: SurfaceMessage) -> Result<()> {
        let Some(tx) = &state.outbound else {
            return Err(Error::SurfaceCommunicationFailed(
                "no rendering surface attached".to_string(),
            ));
        };
        let command = message.command();
        if tx.send(message).is_err() {
            state.outbound = None;
            return Err(Error::SurfaceCommunicationFailed(format!(
                "rendering surface went away while sending {command}"
            )));
        }
        Ok(())
    }

    fn clear_pending(&self, request_id: Uuid) {
        let mut state = self.lock();
        if state
            .pending
            .as_ref()
            .is_some_and(|p| p.request_id == request_id)
        {
            state.pending = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SerializationChannel {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}
