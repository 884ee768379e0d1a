//! UTF-8 line framing over one-way byte pipes.
//!
//! A pipe has no message boundaries of its own. This layer turns it into a
//! stream of frames, one frame per line:
//! - Frames are UTF-8 text terminated by `\n` (a preceding `\r` is dropped)
//! - A trailing unterminated line is still delivered at end-of-stream
//! - `SYNC` and `END` are reserved frame prefixes that bracket a message
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod markers;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_final_line, decode_line, encode_line, FrameConfig, DEFAULT_MAX_LINE_LEN, LINE_ENDING,
};
pub use error::{FrameError, Result};
pub use markers::{is_end, is_sync, END, SYNC};
pub use reader::LineReader;
pub use writer::LineWriter;
