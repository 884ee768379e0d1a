//! Duplex messaging between a process and the child it spawns.
//!
//! pipeduplex connects a parent and a child over two anonymous pipes, one per
//! direction, and exchanges one framed message each way: `SYNC`, payload
//! lines, `END`.
//!
//! # Crate Structure
//!
//! - [`transport`]: anonymous pipe pairs, inheritable handles, drain
//! - [`frame`]: UTF-8 line codec and the `SYNC`/`END` markers
//! - [`peer`]: the exchange state machine with initiator and responder roles
//!   (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use pipeduplex_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipeduplex_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use pipeduplex_peer::*;
}
