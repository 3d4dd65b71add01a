//! Serialization payloads exchanged with the rendering surface.
//!
//! A payload is produced transiently while saving. It is never persisted as
//! such: its content is folded into [`crate::TerminalSessionRecord::scrollback`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TerminalId;

/// Schema version stamped into payload metadata.
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

/// Metadata describing one serialized terminal buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    /// Number of lines in the original (uncompressed) content
    pub line_count: usize,
    /// Size in bytes of the original (uncompressed) content
    pub byte_size: usize,
    /// Whether `content` is compressed
    pub compressed: bool,
    /// Content encoding tag when compressed, such as `gzip+base64`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// When the buffer was serialized
    pub timestamp: DateTime<Utc>,
    /// Payload schema version
    pub schema_version: u32,
}

/// One terminal's serialized buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedTerminal {
    /// Buffer content, compressed when `metadata.compressed` is set
    pub content: String,
    /// Optional HTML rendering of the buffer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Content metadata
    pub metadata: PayloadMetadata,
}

/// Mapping from terminal ID to its serialized buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializationPayload(BTreeMap<TerminalId, SerializedTerminal>);

impl SerializationPayload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a terminal's buffer, replacing any previous entry.
    pub fn insert(&mut self, id: TerminalId, terminal: SerializedTerminal) {
        self.0.insert(id, terminal);
    }

    /// Get a terminal's buffer.
    pub fn get(&self, id: &TerminalId) -> Option<&SerializedTerminal> {
        self.0.get(id)
    }

    /// Remove and return a terminal's buffer.
    pub fn remove(&mut self, id: &TerminalId) -> Option<SerializedTerminal> {
        self.0.remove(id)
    }

    /// Number of terminals in the payload.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (&TerminalId, &SerializedTerminal)> {
        self.0.iter()
    }
}

impl FromIterator<(TerminalId, SerializedTerminal)> for SerializationPayload {
    fn from_iter<I: IntoIterator<Item = (TerminalId, SerializedTerminal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content: &str) -> SerializedTerminal {
        SerializedTerminal {
            content: content.to_string(),
            html: None,
            metadata: PayloadMetadata {
                line_count: content.lines().count(),
                byte_size: content.len(),
                compressed: false,
                encoding: None,
                timestamp: Utc::now(),
                schema_version: PAYLOAD_SCHEMA_VERSION,
            },
        }
    }

    #[test]
    fn test_payload_insert_and_get() {
        let mut payload = SerializationPayload::new();
        assert!(payload.is_empty());

        payload.insert(TerminalId::from("t1"), entry("hello\nworld"));
        assert_eq!(payload.len(), 1);
        assert_eq!(
            payload.get(&TerminalId::from("t1")).unwrap().metadata.line_count,
            2
        );
        assert!(payload.get(&TerminalId::from("t2")).is_none());
    }

    #[test]
    fn test_payload_serializes_as_map() {
        let payload: SerializationPayload = vec![(TerminalId::from("t1"), entry("x"))]
            .into_iter()
            .collect();

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["t1"]["content"], "x");
        assert_eq!(json["t1"]["metadata"]["compressed"], false);
        assert_eq!(json["t1"]["metadata"]["schemaVersion"], PAYLOAD_SCHEMA_VERSION);
        assert!(json["t1"]["metadata"].get("encoding").is_none());
    }

    #[test]
    fn test_metadata_without_encoding_tag_parses() {
        let json = r#"{
            "lineCount": 1,
            "byteSize": 3,
            "compressed": false,
            "timestamp": "2026-01-01T00:00:00Z",
            "schemaVersion": 1
        }"#;
        let metadata: PayloadMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.encoding, None);
    }
}
