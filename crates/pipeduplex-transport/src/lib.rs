//! Anonymous pipe transport for parent/child duplex IPC.
//!
//! A duplex conversation is carried over two one-way pipes. The parent
//! creates both, hands the far ends to a child process as descriptor
//! strings on its command line, and keeps the near ends:
//! - [`DuplexPipeServer`] creates the pair and prepares the child command
//! - [`attach`] opens the far ends inside the child from its arguments
//! - [`PipeEnd`] is the blocking `Read`/`Write` stream both sides use
//!
//! This is the lowest layer of pipeduplex. Line framing and the
//! SYNC/END exchange build on the [`PipeEnd`] type provided here.
//!
//! Pipes are only provided on Linux and Android. Draining reads the unread
//! byte count of the write end (`FIONREAD`), which only those kernels report;
//! BSD-derived kernels account the bytes to the read end.

pub mod error;
pub mod handle;
pub mod traits;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod pair;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod pipe;

pub use error::{Result, TransportError};
pub use handle::{PipeDirection, PipeHandle};
pub use traits::{Close, Drain};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use pair::{attach, AnonymousPipeServer, ClientHandles, DuplexEnds, DuplexPipeServer};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use pipe::{anonymous_pipe, PipeEnd};
