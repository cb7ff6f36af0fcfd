//! Framed I/O for the IMAP wire format.
//!
//! A response is a CRLF-terminated line, possibly interrupted by literals
//! (`{n}\r\n` followed by `n` raw bytes, after which the line continues).
//! Every read and write is bounded by a deadline so a half-open socket
//! surfaces as [`Error::Timeout`] instead of hanging the caller.
//!
//! Reading is cancel-safe: bytes are only removed from the internal buffer
//! once a complete response is available, so dropping a pending read (for
//! example when an IDLE cycle times out) never loses data.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

const INITIAL_BUFFER: usize = 8192;

/// Maximum length of a single line, excluding literals.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Maximum literal size accepted from the server.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Buffered, deadline-enforcing IMAP stream.
pub struct FramedStream<S> {
    stream: S,
    buf: BytesMut,
    io_timeout: Option<Duration>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream`. `io_timeout` bounds every read and write; `None`
    /// disables deadlines (only sensible in tests).
    pub fn new(stream: S, io_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(INITIAL_BUFFER),
            io_timeout,
        }
    }

    /// Returns the configured I/O deadline.
    #[must_use]
    pub const fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout
    }

    /// Reads one complete response within the I/O deadline.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let timeout = self.io_timeout;
        with_deadline(timeout, self.fill_until_complete()).await
    }

    /// Reads one response, waiting at most `wait`.
    ///
    /// Returns `Ok(None)` when nothing complete arrived in time. Partial data
    /// stays buffered for the next call.
    pub async fn read_response_within(&mut self, wait: Duration) -> Result<Option<Vec<u8>>> {
        match tokio::time::timeout(wait, self.fill_until_complete()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn fill_until_complete(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(len) = complete_response_len(&self.buf)? {
                return Ok(self.buf.split_to(len).to_vec());
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }

    /// Writes a serialized command and flushes it.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.io_timeout;
        let stream = &mut self.stream;
        with_deadline(timeout, async move {
            stream.write_all(data).await?;
            stream.flush().await?;
            Ok(())
        })
        .await
    }

    /// Returns the inner stream for a TLS upgrade.
    ///
    /// Fails if the server pipelined bytes after the STARTTLS response, since
    /// those would otherwise be treated as if they arrived over TLS.
    pub fn into_inner(self) -> Result<S> {
        if self.buf.is_empty() {
            Ok(self.stream)
        } else {
            Err(Error::Protocol(
                "unexpected plaintext data after STARTTLS".to_string(),
            ))
        }
    }
}

/// Runs `fut` under an optional deadline, mapping expiry to [`Error::Timeout`].
pub(crate) async fn with_deadline<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}

/// Returns the byte length of the first complete response in `buf`, if any.
fn complete_response_len(buf: &[u8]) -> Result<Option<usize>> {
    let mut pos = 0;
    loop {
        let Some(rel) = find_crlf(&buf[pos..]) else {
            if buf.len() - pos > MAX_LINE_LENGTH {
                return Err(Error::Protocol("response line too long".to_string()));
            }
            return Ok(None);
        };
        let line_end = pos + rel + 2;
        let Some(literal) = literal_length(&buf[pos..line_end]) else {
            return Ok(Some(line_end));
        };
        if literal > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!(
                "literal too large: {literal} bytes (max {MAX_LITERAL_SIZE})"
            )));
        }
        pos = line_end + literal;
        if pos > buf.len() {
            return Ok(None);
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses `{123}\r\n` or `{123+}\r\n` at the end of a line.
fn literal_length(line: &[u8]) -> Option<usize> {
    let body = line.strip_suffix(b"\r\n")?.strip_suffix(b"}")?;
    let body = body.strip_suffix(b"+").unwrap_or(body);
    let open = body.iter().rposition(|&b| b == b'{')?;
    let digits = &body[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
