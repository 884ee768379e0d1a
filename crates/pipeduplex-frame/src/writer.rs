use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_line, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes complete lines to any `Write` stream.
pub struct LineWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> LineWriter<T> {
    /// Create a new line writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new line writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send one line, then flush (blocking).
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        if line.len() > self.config.max_line_len {
            return Err(FrameError::LineTooLong {
                size: line.len(),
                max: self.config.max_line_len,
            });
        }

        self.buf.clear();
        encode_line(line, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Send several lines in order.
    pub fn write_lines<I, S>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.write_line(line.as_ref())?;
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current line writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    use pipeduplex_transport::{anonymous_pipe, Close};

    use super::*;
    use crate::reader::LineReader;

    #[test]
    fn write_single_line() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_line("hello").unwrap();
        assert_eq!(writer.into_inner().into_inner(), b"hello\n");
    }

    #[test]
    fn write_lines_preserves_order() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_lines(["SYNC", "one", "", "two", "END"]).unwrap();
        assert_eq!(
            writer.into_inner().into_inner(),
            b"SYNC\none\n\ntwo\nEND\n"
        );
    }

    #[test]
    fn embedded_break_rejected_before_writing() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        let err = writer.write_line("a\nb").unwrap_err();
        assert!(matches!(err, FrameError::EmbeddedLineBreak { position: 1 }));
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[test]
    fn line_too_long_rejected() {
        let cfg = FrameConfig {
            max_line_len: 4,
            ..FrameConfig::default()
        };
        let mut writer = LineWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let err = writer.write_line("oversized").unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { size: 9, max: 4 }));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = LineWriter::new(sink);

        writer.write_line("x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let mut writer = LineWriter::new(InterruptedWriteThenFlush::default());
        writer.write_line("retry").unwrap();
        assert_eq!(writer.into_inner().data, b"retry\n");
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = LineWriter::new(ZeroWriter);
        let err = writer.write_line("x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn broken_pipe_surfaces_as_io_error() {
        let (reader, writer) = anonymous_pipe().unwrap();
        drop(reader);

        let mut writer = LineWriter::new(writer);
        let err = writer.write_line("nobody listening").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn written_lines_decode_over_pipe() {
        let (reader, writer) = anonymous_pipe().unwrap();
        let mut writer = LineWriter::new(writer);
        writer.write_lines(["SYNC", "payload", "END"]).unwrap();
        writer.get_mut().close().unwrap();

        let mut reader = LineReader::new(reader);
        let mut lines = Vec::new();
        while let Some(line) = reader.read_line().unwrap() {
            lines.push(line);
        }
        assert_eq!(lines, ["SYNC", "payload", "END"]);
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        let _ = writer.config();
        let mut inner = writer.into_inner();
        let mut out = Vec::new();
        inner.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
