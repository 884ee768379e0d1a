use std::time::Duration;

use crate::error::Result;

/// A write stream that can block until its reader has consumed everything
/// written so far.
///
/// Used as a synchronization point, not for flow control: once
/// `wait_for_drain` returns, every byte previously written has left the
/// channel and sits in the peer's receive buffer.
pub trait Drain {
    /// Block until no written bytes remain in the channel.
    ///
    /// `None` waits indefinitely.
    fn wait_for_drain(&mut self, timeout: Option<Duration>) -> Result<()>;
}

/// A stream whose OS handle can be released before it is dropped.
///
/// Closing is idempotent: a second call (or the eventual drop) is a no-op.
pub trait Close {
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

impl<T: Drain + ?Sized> Drain for &mut T {
    fn wait_for_drain(&mut self, timeout: Option<Duration>) -> Result<()> {
        (**self).wait_for_drain(timeout)
    }
}

impl<T: Close + ?Sized> Close for &mut T {
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}
