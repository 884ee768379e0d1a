use pipeduplex_peer::Responder;
use pipeduplex_transport::ClientHandles;
use tracing::{debug, info};

use crate::cmd::RespondArgs;
use crate::exit::{peer_error, transport_error, CliResult, SUCCESS};

pub const DEFAULT_REPLY: &str = "Hello from Process B!";

pub fn run(args: RespondArgs) -> CliResult<i32> {
    // Fewer than two handles: not started by an initiator. Touch nothing.
    let Some(handles) = ClientHandles::from_args(&args.handles)
        .map_err(|err| transport_error("invalid pipe handle", err))?
    else {
        debug!(handles = args.handles.len(), "no pipe handles; nothing to answer");
        return Ok(SUCCESS);
    };

    let config = args.exchange.exchange_config()?;
    let responder =
        Responder::attach(handles, config).map_err(|err| peer_error("attach failed", err))?;

    let reply = if args.message.is_empty() {
        vec![DEFAULT_REPLY.to_string()]
    } else {
        args.message
    };
    let outcome = responder
        .run(&reply)
        .map_err(|err| peer_error("exchange failed", err))?;
    info!(
        lines = outcome.received.len(),
        "Received message from Process A: {}",
        outcome.received.join("\n")
    );

    Ok(SUCCESS)
}
