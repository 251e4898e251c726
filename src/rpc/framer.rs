//! Transport Framer
//!
//! Newline-delimited frames over an async byte stream. The reader reassembles
//! lines that arrive split across reads; the writer emits each message as
//! one line under a lock so concurrent responses never interleave.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Result, SshMcpError};

/// Frames longer than this are discarded up to their terminating newline
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Splits a byte stream into newline-terminated frames
pub struct LineFramer<R> {
    reader: R,
    buf: Vec<u8>,
    /// Bytes of `buf` already known not to contain a newline
    scanned: usize,
    /// Dropping the rest of an oversized frame
    discarding: bool,
    eof: bool,
    max_frame: usize,
}

impl<R: AsyncRead + Unpin> LineFramer<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_frame(reader, MAX_FRAME_BYTES)
    }

    pub fn with_max_frame(reader: R, max_frame: usize) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            scanned: 0,
            discarding: false,
            eof: false,
            max_frame,
        }
    }

    /// Next non-blank frame without its line terminator, `None` at end of stream
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            while let Some(frame) = self.take_line() {
                if !is_blank(&frame) {
                    return Ok(Some(frame));
                }
            }

            if self.eof {
                let rest = std::mem::take(&mut self.buf);
                self.scanned = 0;
                if std::mem::take(&mut self.discarding) || is_blank(&rest) {
                    return Ok(None);
                }
                return Ok(Some(trim_cr(rest)));
            }

            if self.buf.len() > self.max_frame {
                warn!("Discarding frame larger than {} bytes", self.max_frame);
                self.buf.clear();
                self.scanned = 0;
                self.discarding = true;
            }

            self.buf.reserve(READ_CHUNK);
            if self.reader.read_buf(&mut self.buf).await? == 0 {
                self.eof = true;
            }
        }
    }

    /// Pop one complete line off the buffer, skipping the tail of a discarded frame
    fn take_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let pos = match self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
                Some(offset) => self.scanned + offset,
                None => {
                    self.scanned = self.buf.len();
                    return None;
                }
            };

            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.scanned = 0;
            line.pop();

            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() > self.max_frame {
                warn!("Discarding frame larger than {} bytes", self.max_frame);
                continue;
            }
            return Some(trim_cr(line));
        }
    }
}

fn trim_cr(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}

fn is_blank(frame: &[u8]) -> bool {
    frame.iter().all(u8::is_ascii_whitespace)
}

/// Writes one JSON message per line, atomically with respect to other sends
pub struct FrameWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Serialize `message`, append a newline and flush
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let mut line = serde_json::to_vec(message)
            .map_err(|e| SshMcpError::protocol(format!("Failed to encode message: {}", e)))?;
        line.push(b'\n');

        let mut writer = self.inner.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}
