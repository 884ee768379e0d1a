use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Line terminator written after every frame.
pub const LINE_ENDING: &str = "\n";

/// Default maximum line length (excluding the terminator): 64 KiB.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// Encode one line into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────┬──────┐
/// │ UTF-8 text (no \r or \n) │ \n   │
/// └──────────────────────────┴──────┘
/// ```
pub fn encode_line(line: &str, dst: &mut BytesMut) -> Result<()> {
    if let Some(position) = line.find(['\r', '\n']) {
        return Err(FrameError::EmbeddedLineBreak { position });
    }
    dst.reserve(line.len() + LINE_ENDING.len());
    dst.put_slice(line.as_bytes());
    dst.put_slice(LINE_ENDING.as_bytes());
    Ok(())
}

/// Decode one terminated line from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete line yet.
/// On success, consumes the line and its terminator from the buffer.
pub fn decode_line(src: &mut BytesMut, max_len: usize) -> Result<Option<String>> {
    let Some(newline) = src.iter().position(|&b| b == b'\n') else {
        // A lone trailing '\r' may still become part of "\r\n".
        let pending = src.len() - usize::from(src.last() == Some(&b'\r'));
        if pending > max_len {
            return Err(FrameError::LineTooLong {
                size: pending,
                max: max_len,
            });
        }
        return Ok(None); // Need more data
    };

    let mut line = src.split_to(newline + 1);
    line.truncate(newline);
    strip_carriage_return(&mut line);

    if line.len() > max_len {
        return Err(FrameError::LineTooLong {
            size: line.len(),
            max: max_len,
        });
    }

    Ok(Some(String::from_utf8(line.to_vec())?))
}

/// Decode whatever is left once the stream has ended.
///
/// An unterminated final line is still a frame. Returns `Ok(None)` if the
/// buffer is empty.
pub fn decode_final_line(src: &mut BytesMut, max_len: usize) -> Result<Option<String>> {
    if let Some(line) = decode_line(src, max_len)? {
        return Ok(Some(line));
    }
    if src.is_empty() {
        return Ok(None);
    }

    let mut line = src.split();
    strip_carriage_return(&mut line);
    Ok(Some(String::from_utf8(line.to_vec())?))
}

fn strip_carriage_return(line: &mut BytesMut) {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
}

/// Configuration for line framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length in bytes. Default: 64 KiB.
    pub max_line_len: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            read_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_terminator() {
        let mut buf = BytesMut::new();
        encode_line("Hello from Process A!", &mut buf).unwrap();
        assert_eq!(&buf[..], b"Hello from Process A!\n");
    }

    #[test]
    fn test_encode_rejects_embedded_breaks() {
        let mut buf = BytesMut::new();
        let err = encode_line("two\nlines", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmbeddedLineBreak { position: 3 }));

        let err = encode_line("carriage\rreturn", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmbeddedLineBreak { position: 8 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_line() {
        let mut buf = BytesMut::from(&b"SYN"[..]);
        assert!(decode_line(&mut buf, DEFAULT_MAX_LINE_LEN).unwrap().is_none());
        assert_eq!(&buf[..], b"SYN");
    }

    #[test]
    fn test_decode_multiple_lines() {
        let mut buf = BytesMut::from(&b"SYNC\nfirst\r\n\nEND\n"[..]);

        let lines: Vec<_> = std::iter::from_fn(|| decode_line(&mut buf, 64).unwrap()).collect();
        assert_eq!(lines, ["SYNC", "first", "", "END"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_line_too_long() {
        let mut buf = BytesMut::from(&b"abcdefgh\n"[..]);
        let err = decode_line(&mut buf, 4).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { size: 8, max: 4 }));
    }

    #[test]
    fn test_decode_unterminated_line_too_long() {
        let mut buf = BytesMut::from(&b"abcdefgh"[..]);
        let err = decode_line(&mut buf, 4).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { .. }));
    }

    #[test]
    fn test_decode_waits_on_trailing_carriage_return() {
        let mut buf = BytesMut::from(&b"abcd\r"[..]);
        assert!(decode_line(&mut buf, 4).unwrap().is_none());
        buf.extend_from_slice(b"\n");
        assert_eq!(decode_line(&mut buf, 4).unwrap().as_deref(), Some("abcd"));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut buf = BytesMut::from(&[0xff, 0xfe, b'\n'][..]);
        let err = decode_line(&mut buf, 64).unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8(_)));
    }

    #[test]
    fn test_final_line_without_terminator() {
        let mut buf = BytesMut::from(&b"END\r"[..]);
        let line = decode_final_line(&mut buf, 64).unwrap();
        assert_eq!(line.as_deref(), Some("END"));
        assert!(decode_final_line(&mut buf, 64).unwrap().is_none());
    }

    #[test]
    fn test_final_line_prefers_terminated_lines() {
        let mut buf = BytesMut::from(&b"one\ntwo"[..]);
        assert_eq!(decode_final_line(&mut buf, 64).unwrap().as_deref(), Some("one"));
        assert_eq!(decode_final_line(&mut buf, 64).unwrap().as_deref(), Some("two"));
        assert!(decode_final_line(&mut buf, 64).unwrap().is_none());
    }

    #[test]
    fn test_multibyte_text_survives() {
        let mut buf = BytesMut::new();
        encode_line("héllo → wörld", &mut buf).unwrap();
        let line = decode_line(&mut buf, 64).unwrap().unwrap();
        assert_eq!(line, "héllo → wörld");
    }
}
