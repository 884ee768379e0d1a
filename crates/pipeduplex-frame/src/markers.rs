//! Reserved frame markers.
//!
//! Both markers match by prefix, so `SYNC-1` opens a message and `ENDED`
//! closes one. Payload lines must therefore never start with `END`.

/// Opens a message. The sender drains the pipe right after writing it.
pub const SYNC: &str = "SYNC";

/// Closes a message.
pub const END: &str = "END";

/// Returns true if the frame opens a message.
pub fn is_sync(line: &str) -> bool {
    line.starts_with(SYNC)
}

/// Returns true if the frame closes a message.
pub fn is_end(line: &str) -> bool {
    line.starts_with(END)
}
