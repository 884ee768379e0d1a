use pipeduplex_peer::Initiator;
use tracing::info;

use crate::cmd::InitiateArgs;
use crate::exit::{io_error, peer_error, CliResult, SUCCESS};
use crate::logging::LogSettings;
use crate::output::{
    print_report, print_status, received_line, OutputFormat, SENDING_MESSAGE, STARTED_APPLICATION,
    STARTED_RESPONDER,
};

pub const DEFAULT_MESSAGE: &str = "Hello from Process A!";

pub fn run(args: InitiateArgs, format: OutputFormat, logging: LogSettings) -> CliResult<i32> {
    let config = args.exchange.exchange_config()?;
    let (program, initiator) = responder_command(&args, logging)?;
    let message = if args.message.is_empty() {
        vec![DEFAULT_MESSAGE.to_string()]
    } else {
        args.message
    };

    print_status(STARTED_APPLICATION, format);
    let report = initiator
        .with_exchange_config(config)
        .run_with(|| {
            print_status(STARTED_RESPONDER, format);
            print_status(SENDING_MESSAGE, format);
            message
        })
        .map_err(|err| peer_error("exchange failed", err))?;
    info!("{}", received_line(&report.outcome.received));

    print_report(&report, &program, format);
    Ok(SUCCESS)
}

/// Build the responder invocation: an explicit program with its own
/// arguments, or this executable's `respond` command carrying the same
/// exchange and logging settings.
fn responder_command(args: &InitiateArgs, logging: LogSettings) -> CliResult<(String, Initiator)> {
    if let Some(program) = &args.responder {
        let initiator = args
            .responder_arg
            .iter()
            .fold(Initiator::new(program), |initiator, arg| initiator.arg(arg));
        return Ok((program.clone(), initiator));
    }

    let exe = std::env::current_exe()
        .map_err(|err| io_error("cannot locate the pipeduplex executable", err))?;
    let mut initiator = Initiator::new(&exe)
        .arg("--log-format")
        .arg(logging.format.as_arg())
        .arg("--log-level")
        .arg(logging.level.as_arg())
        .arg("respond");
    if let Some(timeout) = &args.exchange.timeout {
        initiator = initiator.arg("--timeout").arg(timeout);
    }
    if args.exchange.implicit_end {
        initiator = initiator.arg("--implicit-end");
    }
    Ok((exe.display().to_string(), initiator))
}
