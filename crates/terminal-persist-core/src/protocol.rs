//! Message protocol between the session authority and the rendering surface.
//!
//! Messages are JSON objects tagged by `command`. The host sends
//! [`SurfaceMessage`]s; the surface answers with [`HostMessage`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::SerializationPayload;
use crate::session::{EnvelopeConfig, TerminalId};

/// Terminal content pushed to the surface during restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreTerminal {
    /// Terminal to write into (the newly created ID)
    pub id: TerminalId,
    /// Display name
    pub name: String,
    /// Whether this is the active terminal
    pub is_active: bool,
    /// Scrollback lines, oldest first
    pub scrollback: Vec<String>,
}

/// Terminal entry of an informational session push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoTerminal {
    /// Terminal identifier
    pub id: TerminalId,
    /// Display name
    pub name: String,
    /// Ordinal number
    pub ordinal_number: u32,
    /// Whether it is active
    pub is_active: bool,
}

/// Messages sent from the session authority to the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum SurfaceMessage {
    /// Ask the surface to serialize the given terminals.
    #[serde(rename_all = "camelCase")]
    RequestSerialization {
        /// Correlation ID echoed in the response
        request_id: Uuid,
        /// Terminals to serialize
        terminal_ids: Vec<TerminalId>,
        /// When the request was issued
        timestamp: DateTime<Utc>,
    },

    /// Write restored content into surface terminals. No acknowledgement.
    #[serde(rename_all = "camelCase")]
    RestoreContent {
        /// Terminals and their content
        terminals: Vec<RestoreTerminal>,
        /// When the push was issued
        timestamp: DateTime<Utc>,
    },

    /// Informational snapshot of the saved session.
    #[serde(rename_all = "camelCase")]
    SessionInfo {
        /// Saved terminals
        terminals: Vec<SessionInfoTerminal>,
        /// Active terminal
        active_terminal_id: Option<TerminalId>,
        /// Configuration snapshot
        config: EnvelopeConfig,
        /// When the snapshot was taken
        timestamp: DateTime<Utc>,
    },
}

impl SurfaceMessage {
    /// Command name as it appears on the wire.
    pub fn command(&self) -> &'static str {
        match self {
            SurfaceMessage::RequestSerialization { .. } => "requestSerialization",
            SurfaceMessage::RestoreContent { .. } => "restoreContent",
            SurfaceMessage::SessionInfo { .. } => "sessionInfo",
        }
    }
}

/// Messages sent from the rendering surface back to the session authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostMessage {
    /// Answer to [`SurfaceMessage::RequestSerialization`].
    #[serde(rename_all = "camelCase")]
    SerializationResponse {
        /// Correlation ID from the request
        request_id: Uuid,
        /// Serialized buffers by terminal ID
        payload: SerializationPayload,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_wire_format() {
        let request_id = Uuid::new_v4();
        let msg = SurfaceMessage::RequestSerialization {
            request_id,
            terminal_ids: vec!["t1".into(), "t2".into()],
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["command"], "requestSerialization");
        assert_eq!(json["requestId"], request_id.to_string());
        assert_eq!(json["terminalIds"][1], "t2");
        assert_eq!(msg.command(), "requestSerialization");
    }

    #[test]
    fn test_restore_content_wire_format() {
        let msg = SurfaceMessage::RestoreContent {
            terminals: vec![RestoreTerminal {
                id: "t9".into(),
                name: "bash".into(),
                is_active: true,
                scrollback: vec!["$ echo hi".into(), "hi".into()],
            }],
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["command"], "restoreContent");
        assert_eq!(json["terminals"][0]["isActive"], true);
        assert_eq!(json["terminals"][0]["scrollback"][1], "hi");
    }

    #[test]
    fn test_serialization_response_parses() {
        let request_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"command":"serializationResponse","requestId":"{request_id}","payload":{{}}}}"#
        );

        let msg: HostMessage = serde_json::from_str(&raw).unwrap();
        match msg {
            HostMessage::SerializationResponse {
                request_id: id,
                payload,
            } => {
                assert_eq!(id, request_id);
                assert!(payload.is_empty());
            }
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let raw = r#"{"command":"resize","cols":80}"#;
        assert!(serde_json::from_str::<SurfaceMessage>(raw).is_err());
    }
}
