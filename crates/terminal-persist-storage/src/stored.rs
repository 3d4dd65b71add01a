//! Stored representation of a session envelope.
//!
//! Identical to [`SessionEnvelope`] except that each record's scrollback is
//! either a plain line array or an encoded blob. Both shapes deserialize, so
//! envelopes written without compression still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use terminal_persist_core::{
    CompanionKind, EnvelopeConfig, Error, Result, SessionEnvelope, TerminalId,
    TerminalSessionRecord, ENVELOPE_VERSION,
};

use crate::codec::SessionCodec;

/// Scrollback as it appears at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredScrollback {
    /// Plain lines (below the compression threshold)
    Lines(Vec<String>),
    /// Newline-joined lines run through a content codec
    #[serde(rename_all = "camelCase")]
    Encoded {
        /// Encoding tag, e.g. `gzip+base64`
        encoding: String,
        /// Encoded data
        data: String,
        /// Number of lines before encoding
        line_count: usize,
    },
}

/// A terminal record as it appears at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Terminal identifier at save time
    pub id: TerminalId,
    /// Display name
    pub name: String,
    /// Ordinal number
    pub ordinal_number: u32,
    /// Working directory
    #[serde(default)]
    pub working_directory: String,
    /// Whether it was active
    #[serde(default)]
    pub is_active: bool,
    /// Scrollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrollback: Option<StoredScrollback>,
    /// Companion process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_process_type: Option<CompanionKind>,
    /// Last activity
    pub last_activity: DateTime<Utc>,
}

/// A session envelope as it appears at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEnvelope {
    /// Envelope format version
    pub version: String,
    /// Creation instant
    pub timestamp: DateTime<Utc>,
    /// Active terminal
    #[serde(default)]
    pub active_terminal_id: Option<TerminalId>,
    /// Records
    pub terminals: Vec<StoredRecord>,
    /// Configuration snapshot
    pub config: EnvelopeConfig,
}

/// Whether an envelope version can be read by this build.
fn is_supported_version(version: &str) -> bool {
    version.split('.').next() == ENVELOPE_VERSION.split('.').next()
}

impl SessionCodec {
    /// Convert an in-memory envelope into its stored representation.
    pub fn encode_envelope(&self, envelope: &SessionEnvelope) -> Result<StoredEnvelope> {
        let terminals = envelope
            .terminals
            .iter()
            .map(|record| self.encode_record(record))
            .collect::<Result<Vec<_>>>()?;

        Ok(StoredEnvelope {
            version: envelope.version.clone(),
            timestamp: envelope.timestamp,
            active_terminal_id: envelope.active_terminal_id.clone(),
            terminals,
            config: envelope.config,
        })
    }

    /// Convert a stored envelope back into memory.
    pub fn decode_envelope(&self, stored: StoredEnvelope) -> Result<SessionEnvelope> {
        if !is_supported_version(&stored.version) {
            return Err(Error::InvalidDataFormat(format!(
                "unsupported envelope version '{}' (expected {})",
                stored.version, ENVELOPE_VERSION
            )));
        }

        let terminals = stored
            .terminals
            .into_iter()
            .map(|record| self.decode_record(record))
            .collect::<Result<Vec<_>>>()?;

        Ok(SessionEnvelope {
            version: stored.version,
            timestamp: stored.timestamp,
            active_terminal_id: stored.active_terminal_id,
            terminals,
            config: stored.config,
        })
    }

    fn encode_record(&self, record: &TerminalSessionRecord) -> Result<StoredRecord> {
        let scrollback = match &record.scrollback {
            None => None,
            Some(lines) => {
                let joined = lines.join("\n");
                let encoded = self.encode(&joined)?;
                if encoded.compressed {
                    Some(StoredScrollback::Encoded {
                        encoding: self.encoding().to_string(),
                        data: encoded.content,
                        line_count: lines.len(),
                    })
                } else {
                    Some(StoredScrollback::Lines(lines.clone()))
                }
            }
        };

        Ok(StoredRecord {
            id: record.id.clone(),
            name: record.name.clone(),
            ordinal_number: record.ordinal_number,
            working_directory: record.working_directory.clone(),
            is_active: record.is_active,
            scrollback,
            companion_process_type: record.companion_process_type,
            last_activity: record.last_activity,
        })
    }

    fn decode_record(&self, record: StoredRecord) -> Result<TerminalSessionRecord> {
        let scrollback = match record.scrollback {
            None => None,
            Some(StoredScrollback::Lines(lines)) => Some(lines),
            Some(StoredScrollback::Encoded {
                encoding,
                data,
                line_count,
            }) => {
                let joined = self.decode_tagged(&encoding, &data)?;
                let lines: Vec<String> = joined.split('\n').map(str::to_string).collect();
                if lines.len() != line_count {
                    warn!(
                        "Scrollback line count mismatch for terminal {}: stored={}, decoded={}",
                        record.id,
                        line_count,
                        lines.len()
                    );
                }
                Some(lines)
            }
        };

        Ok(TerminalSessionRecord {
            id: record.id,
            name: record.name,
            ordinal_number: record.ordinal_number,
            working_directory: record.working_directory,
            is_active: record.is_active,
            scrollback,
            companion_process_type: record.companion_process_type,
            last_activity: record.last_activity,
        })
    }
}
