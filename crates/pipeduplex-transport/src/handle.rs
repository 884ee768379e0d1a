use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Lowest descriptor a pipe handle may name. 0-2 are replaced by the
/// child's standard streams during spawn, so they can never carry a pipe
/// across the boundary.
pub const MIN_HANDLE_FD: i32 = 3;

/// Which way bytes flow through a pipe end, from the holder's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeDirection {
    /// The holder reads.
    In,
    /// The holder writes.
    Out,
}

impl PipeDirection {
    /// The direction the other end of the same pipe has.
    pub fn reverse(self) -> Self {
        match self {
            Self::In => Self::Out,
            Self::Out => Self::In,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "read-only",
            Self::Out => "write-only",
        }
    }
}

impl fmt::Display for PipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor for the far end of a pipe, passed to a child process as a
/// command-line argument.
///
/// The textual form is the decimal descriptor number. A handle is not
/// `Clone`: it is consumed by [`attach`](crate::attach), which takes
/// ownership of the descriptor it names.
#[derive(Debug, PartialEq, Eq)]
pub struct PipeHandle {
    fd: i32,
}

impl PipeHandle {
    pub(crate) fn from_raw(fd: i32) -> Self {
        Self { fd }
    }

    /// Parse a handle received on the command line.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(invalid(value, "empty handle"));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(value, "expected a decimal descriptor number"));
        }

        let fd: i32 = trimmed
            .parse()
            .map_err(|_| invalid(value, "descriptor number out of range"))?;
        if fd < MIN_HANDLE_FD {
            return Err(invalid(value, "standard stream descriptors cannot carry a pipe"));
        }

        Ok(Self { fd })
    }

    /// The raw descriptor number this handle names.
    pub fn as_raw(&self) -> i32 {
        self.fd
    }
}

impl FromStr for PipeHandle {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PipeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fd)
    }
}

fn invalid(value: &str, reason: &str) -> TransportError {
    TransportError::InvalidHandle {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
