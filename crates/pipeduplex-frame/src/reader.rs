use std::io::{self, ErrorKind, Read};
use std::time::Instant;

use bytes::BytesMut;
#[cfg(any(target_os = "linux", target_os = "android"))]
use pipeduplex_transport::PipeEnd;
use tracing::trace;

use crate::codec::{decode_final_line, decode_line, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete lines from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete lines.
/// A read that fails (including with a timeout) leaves already-buffered
/// bytes in place, so the call can be retried.
pub struct LineReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    eof: bool,
}

impl<T: Read> LineReader<T> {
    /// Create a new line reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new line reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            eof: false,
        }
    }

    /// Read the next line (blocking).
    ///
    /// Returns `Ok(None)` once the stream has ended and every buffered
    /// line has been returned.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        self.read_line_by(None)
    }

    /// Read the next line, giving up once `deadline` has passed.
    ///
    /// The deadline is checked before every read of the underlying stream,
    /// so a peer that keeps sending bytes without a line break cannot hold
    /// the caller past it. Expiry is reported as an `ErrorKind::TimedOut`
    /// I/O error with the partial line left buffered. A single read that
    /// blocks is not interrupted; bound it with the stream's own timeout.
    pub fn read_line_until(&mut self, deadline: Instant) -> Result<Option<String>> {
        self.read_line_by(Some(deadline))
    }

    fn read_line_by(&mut self, deadline: Option<Instant>) -> Result<Option<String>> {
        loop {
            if self.eof {
                return decode_final_line(&mut self.buf, self.config.max_line_len);
            }
            if let Some(line) = decode_line(&mut self.buf, self.config.max_line_len)? {
                return Ok(Some(line));
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(FrameError::Io(io::Error::new(
                    ErrorKind::TimedOut,
                    "line not complete before deadline",
                )));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                trace!(buffered = self.buf.len(), "end of stream");
                self.eof = true;
                continue;
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Whether the underlying stream has reported end-of-stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current line reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl LineReader<PipeEnd> {
    /// Create a line reader for a pipe end and apply read timeout from config.
    pub fn with_config_pipe(mut inner: PipeEnd, config: FrameConfig) -> Self {
        inner.set_read_timeout(config.read_timeout);
        Self::with_config(inner, config)
    }
}
