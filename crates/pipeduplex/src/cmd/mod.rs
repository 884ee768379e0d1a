use std::time::Duration;

use clap::{Args, Subcommand};
use pipeduplex_peer::{EofPolicy, ExchangeConfig};

use crate::exit::{CliError, CliResult, USAGE};
use crate::logging::LogSettings;
use crate::output::OutputFormat;

pub mod initiate;
pub mod respond;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Spawn a responder, send it a message and print its reply.
    Initiate(InitiateArgs),
    /// Answer an initiator over inherited pipe handles.
    Respond(RespondArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, logging: LogSettings) -> CliResult<i32> {
    match command {
        Command::Initiate(args) => initiate::run(args, format, logging),
        Command::Respond(args) => respond::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Exchange settings shared by both roles.
#[derive(Args, Debug, Clone, Default)]
pub struct ExchangeArgs {
    /// Bound on waiting for the peer (e.g. 500ms, 5s, 2m). Default: wait indefinitely.
    #[arg(long, env = "PIPEDUPLEX_TIMEOUT")]
    pub timeout: Option<String>,
    /// Treat the peer closing its pipe after SYNC as the end of its message.
    #[arg(long)]
    pub implicit_end: bool,
}

impl ExchangeArgs {
    pub fn exchange_config(&self) -> CliResult<ExchangeConfig> {
        let timeout = self.timeout.as_deref().map(parse_duration).transpose()?;
        let eof_policy = if self.implicit_end {
            EofPolicy::ImplicitEnd
        } else {
            EofPolicy::Error
        };
        Ok(ExchangeConfig {
            timeout,
            eof_policy,
            ..ExchangeConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct InitiateArgs {
    /// Message line to send (repeat for several lines).
    #[arg(long, short = 'm', value_name = "TEXT")]
    pub message: Vec<String>,
    /// Responder program. Default: this executable's `respond` command.
    #[arg(long, value_name = "PROGRAM")]
    pub responder: Option<String>,
    /// Argument passed to the responder before the pipe handles (repeatable).
    #[arg(long, value_name = "ARG", allow_hyphen_values = true, requires = "responder")]
    pub responder_arg: Vec<String>,
    #[command(flatten)]
    pub exchange: ExchangeArgs,
}

#[derive(Args, Debug)]
pub struct RespondArgs {
    /// Inherited pipe handles: write handle, then read handle.
    #[arg(value_name = "HANDLE")]
    pub handles: Vec<String>,
    /// Reply line to send (repeat for several lines).
    #[arg(long, short = 'm', value_name = "TEXT")]
    pub message: Vec<String>,
    #[command(flatten)]
    pub exchange: ExchangeArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s`, `2m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = input.strip_suffix('m') {
        (num, "m")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| CliError::new(USAGE, format!("duration out of range: {input}"))),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
