//! Sentinel-delimited chunk framing for JSON documents.
//!
//! A document travels as `CFG_START`, one data frame per `chunk_size` bytes of
//! compact JSON, then `CFG_END`. The decoder is stream-oriented: it is fed one
//! notification at a time and only exposes the buffer once `CFG_END` arrives.

use crate::error::{DoserError, Result};
use serde_json::Value;

/// Request a configuration read.
pub const CFG_GET: &[u8] = b"CFG_GET";
/// Opens a chunked transfer.
pub const CFG_START: &[u8] = b"CFG_START";
/// Closes a chunked transfer.
pub const CFG_END: &[u8] = b"CFG_END";

/// One unit carried by a single write or notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Start,
    Data(Vec<u8>),
    End,
}

impl Frame {
    /// Classify raw notification bytes. Only an exact token match is a control frame.
    pub fn classify(bytes: &[u8]) -> Self {
        if bytes == CFG_START {
            Self::Start
        } else if bytes == CFG_END {
            Self::End
        } else {
            Self::Data(bytes.to_vec())
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Start => CFG_START,
            Self::Data(b) => b,
            Self::End => CFG_END,
        }
    }
}

fn is_control(bytes: &[u8]) -> bool {
    bytes == CFG_START || bytes == CFG_END || bytes == CFG_GET
}

// ── Encoder ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    chunk_size: usize,
}

impl FrameEncoder {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DoserError::Config("chunk_size must be >= 1".into()));
        }
        Ok(Self { chunk_size })
    }

    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split an already serialized payload into frames.
    pub fn encode_payload(&self, payload: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::with_capacity(payload.len().div_ceil(self.chunk_size) + 2);
        frames.push(Frame::Start);
        for chunk in payload.chunks(self.chunk_size) {
            // The peer would read this chunk as a control token.
            if is_control(chunk) {
                return Err(DoserError::Format(format!(
                    "data chunk collides with control token {:?}",
                    String::from_utf8_lossy(chunk)
                )));
            }
            frames.push(Frame::Data(chunk.to_vec()));
        }
        frames.push(Frame::End);
        Ok(frames)
    }

    /// Serialize compactly and frame the result.
    pub fn encode(&self, doc: &Value) -> Result<Vec<Frame>> {
        let payload = serde_json::to_vec(doc).map_err(|e| DoserError::Format(e.to_string()))?;
        self.encode_payload(&payload)
    }
}

// ── Decoder ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Idle,
    Receiving,
}

/// Outcome of feeding one notification to the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// Inside a transfer, nothing to report yet.
    Pending,
    Document(Value),
    /// The transfer was abandoned; the decoder is back to `Idle`.
    Malformed(DoserError),
    /// Data or `CFG_END` outside a transfer.
    Ignored,
}

#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    buffer: Vec<u8>,
    max_len: usize,
}

impl FrameDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            state: DecodeState::Idle,
            buffer: Vec::new(),
            max_len,
        }
    }

    pub const fn state(&self) -> DecodeState {
        self.state
    }

    /// Bytes buffered for the transfer in progress.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial transfer.
    pub fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.buffer.clear();
    }

    pub fn push(&mut self, bytes: &[u8]) -> DecodeEvent {
        match (Frame::classify(bytes), self.state) {
            (Frame::Start, state) => {
                if state == DecodeState::Receiving {
                    tracing::debug!(
                        discarded = self.buffer.len(),
                        "CFG_START mid-transfer; restarting"
                    );
                }
                self.buffer.clear();
                self.state = DecodeState::Receiving;
                DecodeEvent::Pending
            }
            (Frame::Data(_), DecodeState::Idle) => {
                tracing::trace!(len = bytes.len(), "data frame outside transfer ignored");
                DecodeEvent::Ignored
            }
            (Frame::Data(_), DecodeState::Receiving) => {
                if self.buffer.len() + bytes.len() > self.max_len {
                    let len = self.buffer.len() + bytes.len();
                    self.reset();
                    return DecodeEvent::Malformed(DoserError::Format(format!(
                        "document exceeds {} bytes (got {len})",
                        self.max_len
                    )));
                }
                self.buffer.extend_from_slice(bytes);
                DecodeEvent::Pending
            }
            (Frame::End, DecodeState::Idle) => DecodeEvent::Ignored,
            (Frame::End, DecodeState::Receiving) => {
                let parsed = serde_json::from_slice::<Value>(&self.buffer);
                self.reset();
                match parsed {
                    Ok(doc) => DecodeEvent::Document(doc),
                    Err(e) => DecodeEvent::Malformed(DoserError::Format(e.to_string())),
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(8192)
    }
}

/// Decode a complete frame sequence.
///
/// Returns the first completed document or the first malformed transfer.
pub fn decode_frames<I, B>(frames: I) -> Result<Value>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut decoder = FrameDecoder::new(usize::MAX);
    for frame in frames {
        match decoder.push(frame.as_ref()) {
            DecodeEvent::Document(doc) => return Ok(doc),
            DecodeEvent::Malformed(e) => return Err(e),
            DecodeEvent::Pending | DecodeEvent::Ignored => {}
        }
    }
    Err(DoserError::Format("stream ended before CFG_END".into()))
}
