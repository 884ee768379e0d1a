use crate::exchange::ExchangeState;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pipeduplex_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pipeduplex_frame::FrameError),

    /// A read or drain did not complete within the configured bound.
    #[error("exchange timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The peer closed its pipe before sending END.
    #[error("peer closed the pipe while {state} ({} payload lines received)", .received.len())]
    Incomplete {
        state: ExchangeState,
        received: Vec<String>,
    },

    /// An outgoing payload line would break framing.
    #[error("payload line {index} rejected: {reason}")]
    InvalidPayload { index: usize, reason: &'static str },

    /// The responder process could not be started.
    #[error("failed to spawn responder '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Waiting on the responder process failed.
    #[error("failed waiting for responder: {0}")]
    Wait(std::io::Error),

    /// The responder exited unsuccessfully.
    #[error("responder exited with {0}")]
    ResponderFailed(std::process::ExitStatus),
}

pub type Result<T> = std::result::Result<T, PeerError>;
