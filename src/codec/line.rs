//! Line framing for the WMP byte stream
//!
//! Inbound replies are CRLF terminated, outbound commands are sent with a
//! bare LF. Lines may be split across TCP reads, so partial data is kept
//! until its terminator arrives.

use crate::constants::DEFAULT_MAX_LINE_LENGTH;
use crate::error::{Result, WmpError};
use bytes::{Bytes, BytesMut};

const LF: u8 = b'\n';
const CR: u8 = b'\r';

/// Splits inbound bytes into lines and frames outbound commands
///
/// A line longer than `max_line` bytes yields one `FrameTooLong` error;
/// the rest of that line is discarded up to its terminator.
pub struct LineCodec {
    buffer: BytesMut,
    max_line: usize,
    discarding: bool,
}

impl LineCodec {
    /// Create a codec accepting lines up to `max_line` bytes
    pub fn new(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_line.min(4096)),
            max_line,
            discarding: false,
        }
    }

    /// Append received bytes and iterate over the lines they complete
    ///
    /// Lines not consumed from the iterator stay buffered for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Lines<'_> {
        self.buffer.extend_from_slice(data);
        Lines { codec: self }
    }

    /// Frame a command for the wire: ASCII text followed by LF
    pub fn frame(text: &str) -> Result<Bytes> {
        if !text.is_ascii() {
            return Err(WmpError::InvalidCommandText {
                reason: format!("{:?} is not ASCII", text),
            });
        }
        if text.bytes().any(|b| b == LF || b == CR) {
            return Err(WmpError::InvalidCommandText {
                reason: "embedded line terminator".into(),
            });
        }

        let mut out = BytesMut::with_capacity(text.len() + 1);
        out.extend_from_slice(text.as_bytes());
        out.extend_from_slice(&[LF]);
        Ok(out.freeze())
    }

    /// Bytes waiting for a terminator
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    fn next_line(&mut self) -> Option<Result<String>> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == LF) else {
                // Allow one extra byte for a pending CR
                if !self.discarding && self.buffer.len() > self.max_line + 1 {
                    let len = self.buffer.len();
                    self.buffer.clear();
                    self.discarding = true;
                    return Some(Err(WmpError::FrameTooLong {
                        len,
                        max: self.max_line,
                    }));
                }
                if self.discarding {
                    self.buffer.clear();
                }
                return None;
            };

            let mut line = self.buffer.split_to(pos + 1);
            if self.discarding {
                self.discarding = false;
                continue;
            }

            line.truncate(pos);
            if line.last() == Some(&CR) {
                line.truncate(pos - 1);
            }
            if line.is_empty() {
                continue;
            }
            if line.len() > self.max_line {
                return Some(Err(WmpError::FrameTooLong {
                    len: line.len(),
                    max: self.max_line,
                }));
            }

            return Some(Ok(String::from_utf8_lossy(&line).into_owned()));
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

/// Lines completed by one [`LineCodec::feed`] call
pub struct Lines<'a> {
    codec: &'a mut LineCodec,
}

impl Iterator for Lines<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.codec.next_line()
    }
}
