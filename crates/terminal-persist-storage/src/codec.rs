//! Session codec: storage-safe, size-bounded scrollback content.
//!
//! Content longer than the compression threshold (in characters) is run
//! through a [`ContentCodec`]; shorter content passes through unchanged. The
//! `compressed` flag on every output tells the decoder which case applies, so
//! it never has to guess.

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use terminal_persist_core::{
    CodecSettings, CompressionAlgorithm, Error, PayloadMetadata, Result, SerializedTerminal,
    PAYLOAD_SCHEMA_VERSION,
};

/// Encoding tag of gzip output wrapped in standard base64.
pub const GZIP_BASE64_ENCODING: &str = "gzip+base64";

/// Encoding tag of content stored as-is.
pub const IDENTITY_ENCODING: &str = "identity";

/// A reversible content transform.
pub trait ContentCodec: Send + Sync + fmt::Debug {
    /// Tag recorded next to encoded data.
    fn encoding(&self) -> &'static str;

    /// Whether `compress` actually changes its input.
    fn compresses(&self) -> bool {
        true
    }

    /// Encode content into a JSON-safe string.
    fn compress(&self, content: &str) -> Result<String>;

    /// Reverse [`ContentCodec::compress`].
    fn decompress(&self, data: &str) -> Result<String>;
}

/// gzip compression, base64-wrapped so the result stays valid UTF-8.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    /// Create a codec with the default compression level.
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Create a codec with an explicit level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentCodec for GzipCodec {
    fn encoding(&self) -> &'static str {
        GZIP_BASE64_ENCODING
    }

    fn compress(&self, content: &str) -> Result<String> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(content.as_bytes())
            .map_err(|e| Error::CompressionFailed(format!("gzip write failed: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| Error::CompressionFailed(format!("gzip finish failed: {e}")))?;
        Ok(STANDARD.encode(compressed))
    }

    fn decompress(&self, data: &str) -> Result<String> {
        let compressed = STANDARD
            .decode(data)
            .map_err(|e| Error::CompressionFailed(format!("invalid base64: {e}")))?;
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut content = String::new();
        decoder
            .read_to_string(&mut content)
            .map_err(|e| Error::CompressionFailed(format!("gzip read failed: {e}")))?;
        Ok(content)
    }
}

/// No-op codec for hosts that do not want compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl ContentCodec for PassthroughCodec {
    fn encoding(&self) -> &'static str {
        IDENTITY_ENCODING
    }

    fn compresses(&self) -> bool {
        false
    }

    fn compress(&self, content: &str) -> Result<String> {
        Ok(content.to_string())
    }

    fn decompress(&self, data: &str) -> Result<String> {
        Ok(data.to_string())
    }
}

/// Content after encoding, with a truthful compression flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedContent {
    /// Encoded (or untouched) content
    pub content: String,
    /// Whether `content` is compressed
    pub compressed: bool,
}

/// Threshold-gated codec shared by the surface cache and the session store.
#[derive(Debug, Clone)]
pub struct SessionCodec {
    inner: Arc<dyn ContentCodec>,
    threshold: usize,
}

impl SessionCodec {
    /// Default compression threshold, in characters.
    pub const DEFAULT_THRESHOLD: usize = 1000;

    /// Create a codec around `inner` with the given threshold.
    pub fn new(inner: Arc<dyn ContentCodec>, threshold: usize) -> Self {
        Self { inner, threshold }
    }

    /// gzip codec with the default threshold.
    pub fn gzip() -> Self {
        Self::new(Arc::new(GzipCodec::new()), Self::DEFAULT_THRESHOLD)
    }

    /// Build a codec from configuration.
    pub fn from_settings(settings: &CodecSettings) -> Self {
        let inner: Arc<dyn ContentCodec> = match settings.algorithm {
            CompressionAlgorithm::Gzip => Arc::new(GzipCodec::new()),
            CompressionAlgorithm::None => Arc::new(PassthroughCodec),
        };
        Self::new(inner, settings.compression_threshold)
    }

    /// Compression threshold in characters.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Encoding tag of the wrapped codec.
    pub fn encoding(&self) -> &'static str {
        self.inner.encoding()
    }

    /// Whether `content` is long enough to be compressed.
    pub fn exceeds_threshold(&self, content: &str) -> bool {
        // Byte length bounds char count from above
        content.len() > self.threshold && content.chars().count() > self.threshold
    }

    /// Encode content, compressing only above the threshold.
    pub fn encode(&self, content: &str) -> Result<EncodedContent> {
        if self.inner.compresses() && self.exceeds_threshold(content) {
            Ok(EncodedContent {
                content: self.inner.compress(content)?,
                compressed: true,
            })
        } else {
            Ok(EncodedContent {
                content: content.to_string(),
                compressed: false,
            })
        }
    }

    /// Decode content produced by [`SessionCodec::encode`].
    ///
    /// Compressed content cannot be decoded by a codec that never compresses;
    /// use [`SessionCodec::decode_tagged`] when the producer's encoding is known.
    pub fn decode(&self, content: &str, compressed: bool) -> Result<String> {
        if !compressed {
            return Ok(content.to_string());
        }
        if !self.inner.compresses() {
            return Err(Error::InvalidDataFormat(format!(
                "compressed content cannot be decoded with '{}' encoding",
                self.inner.encoding()
            )));
        }
        self.inner.decompress(content)
    }

    /// Decode data tagged with an explicit encoding.
    ///
    /// gzip data stays readable after the host switches compression off.
    pub fn decode_tagged(&self, encoding: &str, data: &str) -> Result<String> {
        if encoding == self.inner.encoding() {
            self.inner.decompress(data)
        } else if encoding == GZIP_BASE64_ENCODING {
            GzipCodec::new().decompress(data)
        } else if encoding == IDENTITY_ENCODING {
            Ok(data.to_string())
        } else {
            Err(Error::InvalidDataFormat(format!(
                "unknown content encoding '{encoding}'"
            )))
        }
    }

    /// Serialize one terminal buffer into a payload entry.
    pub fn encode_terminal(
        &self,
        content: &str,
        html: Option<String>,
    ) -> Result<SerializedTerminal> {
        let encoded = self.encode(content)?;
        Ok(SerializedTerminal {
            content: encoded.content,
            html,
            metadata: PayloadMetadata {
                line_count: content.lines().count(),
                byte_size: content.len(),
                compressed: encoded.compressed,
                encoding: encoded
                    .compressed
                    .then(|| self.inner.encoding().to_string()),
                timestamp: Utc::now(),
                schema_version: PAYLOAD_SCHEMA_VERSION,
            },
        })
    }

    /// Recover the plain content of a payload entry.
    pub fn decode_terminal(&self, terminal: &SerializedTerminal) -> Result<String> {
        if terminal.metadata.schema_version > PAYLOAD_SCHEMA_VERSION {
            return Err(Error::InvalidDataFormat(format!(
                "payload schema version {} is newer than supported version {}",
                terminal.metadata.schema_version, PAYLOAD_SCHEMA_VERSION
            )));
        }
        match (&terminal.metadata.encoding, terminal.metadata.compressed) {
            (Some(encoding), true) => self.decode_tagged(encoding, &terminal.content),
            (_, compressed) => self.decode(&terminal.content, compressed),
        }
    }
}

impl Default for SessionCodec {
    fn default() -> Self {
        Self::gzip()
    }
}

/// Split buffer content into lines.
pub fn split_lines(content: &str) -> Vec<String> {
    content.lines().map(str::to_string).collect()
}

/// Drop trailing blank lines and keep at most the newest `limit` lines.
pub fn optimize_scrollback(mut lines: Vec<String>, limit: usize) -> Vec<String> {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.len() > limit {
        lines.drain(..lines.len() - limit);
    }
    lines
}
