//! Device frame decoding.
//!
//! The device sends bare JSON objects with no length prefix. The firmware
//! normally emits one object per TCP send, terminated by `\r\n`, but TCP does
//! not preserve send boundaries, so the decoder buffers bytes and pulls out
//! every complete JSON value it can:
//!
//! ```text
//! read 1: {"DC":3.3,"Am          -> nothing yet (buffered)
//! read 2: p":0.5}\r\n{"Freq":50} -> frame {DC, Amp}, frame {Freq}
//! read 3: {bad{"DC":1}           -> MalformedFrame("{bad"), frame {DC}
//! ```
//!
//! After a syntax error the decoder reports everything up to the next `{` as
//! malformed and resumes there. Device frames are flat objects, so every `{`
//! past the start of a broken frame is taken as the start of a new one.

use bytes::{Bytes, BytesMut};
use serde_json::Value;

use crate::snapshot::{Fields, STATUS_KEY};

/// Default upper bound on bytes buffered while waiting for a complete frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// One decoded device message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryFrame {
    /// Numeric members of the object.
    pub fields: Fields,
    /// Members that were dropped because they were not numeric or were reserved.
    pub skipped: Vec<String>,
}

/// Bytes that could not be decoded into a frame.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("malformed frame ({reason}): {}", String::from_utf8_lossy(.raw))]
pub struct MalformedFrame {
    /// The discarded bytes.
    pub raw: Bytes,
    /// Why decoding failed.
    pub reason: String,
}

/// Outcome for one frame pulled from the stream.
pub type FrameResult = Result<TelemetryFrame, MalformedFrame>;

/// Incremental JSON frame decoder for the device byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    /// Create a decoder that gives up on a frame once `max_frame_bytes` are
    /// buffered without a complete value.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            max_frame_bytes: max_frame_bytes.max(1),
        }
    }

    /// Buffer for reading straight from the transport (`read_buf`).
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Append a chunk received from the device.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame, e.g. when a session ends.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Decode every complete frame currently buffered, in arrival order.
    pub fn decode(&mut self) -> Vec<FrameResult> {
        let mut out = Vec::new();
        loop {
            let leading = self
                .buf
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            let _ = self.buf.split_to(leading);
            if self.buf.is_empty() {
                break;
            }

            let (next, consumed) = {
                let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
                let next = stream.next();
                (next, stream.byte_offset())
            };

            match next {
                Some(Ok(value)) => {
                    let raw = self.buf.split_to(consumed).freeze();
                    out.push(frame_from_value(value, raw));
                }
                Some(Err(e)) if e.is_eof() => {
                    if self.buf.len() > self.max_frame_bytes {
                        out.push(Err(MalformedFrame {
                            raw: self.buf.split().freeze(),
                            reason: format!(
                                "incomplete frame exceeds {} bytes",
                                self.max_frame_bytes
                            ),
                        }));
                    }
                    break;
                }
                Some(Err(e)) => {
                    let resume = self.next_frame_start().unwrap_or(self.buf.len());
                    out.push(Err(MalformedFrame {
                        raw: self.buf.split_to(resume).freeze(),
                        reason: e.to_string(),
                    }));
                }
                None => break,
            }
        }
        out
    }

    /// Offset of the first `{` after the head of the buffer.
    fn next_frame_start(&self) -> Option<usize> {
        self.buf
            .iter()
            .skip(1)
            .position(|&b| b == b'{')
            .map(|i| i + 1)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

fn frame_from_value(value: Value, raw: Bytes) -> FrameResult {
    let Value::Object(map) = value else {
        return Err(MalformedFrame {
            raw,
            reason: "expected a JSON object".into(),
        });
    };

    let mut fields = Fields::new();
    let mut skipped = Vec::new();
    for (key, value) in map {
        match value {
            Value::Number(n) if key != STATUS_KEY => {
                let _ = fields.insert(key, n);
            }
            _ => skipped.push(key),
        }
    }
    Ok(TelemetryFrame { fields, skipped })
}
