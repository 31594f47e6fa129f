//! Newline framing for raw client byte streams.
//!
//! A [`LineFramer`] owns the accumulation buffer for exactly one connection.
//! Bytes are appended as they arrive and every complete line is drained
//! before control returns to the caller, so the output depends only on the
//! byte sequence and never on where the chunk boundaries fell.

use std::num::NonZeroUsize;

use thiserror::Error;
use ticket_config::{Config, DEFAULT_READ_CHUNK_BYTES};

/// Byte marking the end of a message.
pub const TERMINATOR: u8 = b'\n';

/// Errors raised while framing a connection's byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// A line grew past the configured cap before its terminator arrived.
    #[error("line of {length} bytes exceeds the {limit} byte limit")]
    MessageTooLong {
        /// Configured cap in bytes.
        limit: usize,
        /// Bytes accumulated for the offending line, line ending excluded.
        length: usize,
    },
}

/// Tunables shared by every connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingOptions {
    read_chunk_bytes: NonZeroUsize,
    max_line_bytes: Option<NonZeroUsize>,
}

impl Default for FramingOptions {
    fn default() -> Self {
        Self {
            read_chunk_bytes: NonZeroUsize::new(DEFAULT_READ_CHUNK_BYTES)
                .unwrap_or(NonZeroUsize::MIN),
            max_line_bytes: None,
        }
    }
}

impl FramingOptions {
    /// Builds options from explicit values.
    #[must_use]
    pub const fn new(read_chunk_bytes: NonZeroUsize, max_line_bytes: Option<NonZeroUsize>) -> Self {
        Self {
            read_chunk_bytes,
            max_line_bytes,
        }
    }

    /// Derives options from the resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.read_chunk_bytes(), config.max_line_bytes())
    }

    /// Bytes requested per read.
    #[must_use]
    pub const fn read_chunk_bytes(&self) -> NonZeroUsize {
        self.read_chunk_bytes
    }

    /// Optional cap on a single line.
    #[must_use]
    pub const fn max_line_bytes(&self) -> Option<NonZeroUsize> {
        self.max_line_bytes
    }

    /// Returns a copy with the given line cap.
    #[must_use]
    pub const fn with_max_line_bytes(mut self, limit: Option<NonZeroUsize>) -> Self {
        self.max_line_bytes = limit;
        self
    }

    /// Returns a copy with the given read size.
    #[must_use]
    pub const fn with_read_chunk_bytes(mut self, bytes: NonZeroUsize) -> Self {
        self.read_chunk_bytes = bytes;
        self
    }
}

/// Per-connection buffer that turns appended bytes into trimmed lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    // Length of the buffer prefix already known to hold no terminator.
    scanned: usize,
    max_line_bytes: Option<NonZeroUsize>,
}

impl LineFramer {
    /// Creates a framer without a line cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a framer that rejects lines longer than `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: Option<NonZeroUsize>) -> Self {
        Self {
            max_line_bytes: limit,
            ..Self::default()
        }
    }

    /// Appends `bytes` and returns every payload completed by them, in order.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::MessageTooLong`] when a line exceeds the cap.
    /// The buffer is discarded in that case and lines completed earlier in the
    /// same call are dropped with it; callers that must see those lines use
    /// [`LineFramer::extend`] with [`LineFramer::next_message`] instead.
    pub fn append(&mut self, bytes: &[u8]) -> Result<Vec<String>, FramingError> {
        self.extend(bytes);
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Buffers `bytes` without scanning them.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete payload, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::MessageTooLong`] when the next line, complete
    /// or not, is longer than the cap. The buffer is cleared first.
    pub fn next_message(&mut self) -> Result<Option<String>, FramingError> {
        let unscanned = self.buffer.get(self.scanned..).unwrap_or_default();
        let Some(offset) = unscanned.iter().position(|byte| *byte == TERMINATOR) else {
            self.scanned = self.buffer.len();
            self.enforce_limit(line_length(&self.buffer))?;
            return Ok(None);
        };

        let end = self.scanned + offset;
        self.enforce_limit(line_length(self.buffer.get(..end).unwrap_or_default()))?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        self.scanned = 0;
        Ok(Some(decode_payload(&line)))
    }

    /// Bytes received since the last terminator.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of bytes received since the last terminator.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    fn enforce_limit(&mut self, length: usize) -> Result<(), FramingError> {
        match self.max_line_bytes {
            Some(limit) if length > limit.get() => {
                self.clear();
                Err(FramingError::MessageTooLong {
                    limit: limit.get(),
                    length,
                })
            }
            _ => Ok(()),
        }
    }
}

// Length counted against the cap. A trailing carriage return belongs to the
// line ending, so CRLF and LF lines share the same limit.
fn line_length(line: &[u8]) -> usize {
    line.strip_suffix(b"\r").map_or(line.len(), <[u8]>::len)
}

fn decode_payload(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim().to_owned()
}
