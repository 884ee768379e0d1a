//! Duplex message exchange between a parent process and its child.
//!
//! This is the "just works" layer. The [`Initiator`] creates the pipe pair,
//! spawns the responder and talks first; the [`Responder`] attaches to the
//! inherited pipes from its arguments and talks second. Both drive the same
//! [`Exchange`] state machine with mirrored roles.

pub mod error;
pub mod exchange;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod initiator;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod responder;

pub use error::{PeerError, Result};
pub use exchange::{
    receive_message, send_message, EofPolicy, Exchange, ExchangeConfig, ExchangeOutcome,
    ExchangeState, MessageAssembler, Role,
};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use initiator::{Initiator, InitiatorReport};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use responder::Responder;
