use pipeduplex_transport::{attach, ClientHandles, PipeEnd};
use tracing::debug;

use crate::error::Result;
use crate::exchange::{Exchange, ExchangeConfig, ExchangeOutcome, Role};

/// Child side: attaches to the inherited pipes and talks second.
pub struct Responder {
    exchange: Exchange<PipeEnd, PipeEnd>,
}

impl Responder {
    /// Attach using the process's positional arguments.
    ///
    /// Returns `Ok(None)` when fewer than two arguments were given: the
    /// process was not started as a responder and must not touch any
    /// descriptor. Malformed handles fail before anything is attached.
    pub fn from_args<S: AsRef<str>>(args: &[S], config: ExchangeConfig) -> Result<Option<Self>> {
        let Some(handles) = ClientHandles::from_args(args)? else {
            debug!(args = args.len(), "not enough pipe handles; skipping exchange");
            return Ok(None);
        };
        Self::attach(handles, config).map(Some)
    }

    /// Attach to explicit handles.
    pub fn attach(handles: ClientHandles, config: ExchangeConfig) -> Result<Self> {
        debug!(write = %handles.write, read = %handles.read, "attaching responder pipes");
        let ends = attach(handles)?;
        Ok(Self {
            exchange: Exchange::from_pipes(ends, Role::Responder, config),
        })
    }

    /// Receive the initiator's message, then send `reply`.
    pub fn run<S: AsRef<str>>(self, reply: &[S]) -> Result<ExchangeOutcome> {
        self.exchange.run(reply)
    }

    /// Receive the initiator's message, then send whatever `compose`
    /// builds from it.
    pub fn run_with<F>(self, compose: F) -> Result<ExchangeOutcome>
    where
        F: FnOnce(&[String]) -> Vec<String>,
    {
        self.exchange.run_with(compose)
    }
}
