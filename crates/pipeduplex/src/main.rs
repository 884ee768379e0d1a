#[cfg(any(target_os = "linux", target_os = "android"))]
mod cmd;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod exit;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod logging;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod output;

#[cfg(any(target_os = "linux", target_os = "android"))]
use clap::Parser;

#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::cmd::Command;
#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::logging::{init_logging, LogFormat, LogLevel, LogSettings};
#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::output::OutputFormat;

#[cfg(any(target_os = "linux", target_os = "android"))]
#[derive(Parser, Debug)]
#[command(
    name = "pipeduplex",
    version,
    about = "Duplex messaging with a spawned child over anonymous pipes"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn main() {
    let cli = Cli::parse();
    let logging = LogSettings {
        format: cli.log_format,
        level: cli.log_level,
    };
    init_logging(logging);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format, logging);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn main() {
    eprintln!("error: pipeduplex pipes are only supported on Linux and Android");
    std::process::exit(1);
}
