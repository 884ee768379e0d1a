use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pipeduplex_peer::InitiatorReport;
use serde::Serialize;
use tracing::info;

pub const STARTED_APPLICATION: &str = "Started application (Process A)...";
pub const STARTED_RESPONDER: &str = "Started other process (Process B)...";
pub const SENDING_MESSAGE: &str = "Sending message to Process B...";
pub const RECEIVED_PREFIX: &str = "Received message from Process B: ";

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ExchangeOutput<'a> {
    responder_program: &'a str,
    #[serde(flatten)]
    report: &'a InitiatorReport,
}

pub fn print_report(report: &InitiatorReport, responder_program: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ExchangeOutput {
                responder_program,
                report,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["RESPONDER", "PID", "EXIT", "SENT", "RECEIVED"])
                .add_row(vec![
                    responder_program.to_string(),
                    report.responder_pid.to_string(),
                    exit_code_label(report.responder_exit_code),
                    report.outcome.sent.join("\n"),
                    report.outcome.received.join("\n"),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            // Earlier status lines were already printed by `print_status`.
            println!("{}", received_line(&report.outcome.received));
        }
        OutputFormat::Raw => {
            print_raw_lines(&report.outcome.received);
        }
    }
}

/// Report progress as it happens: always logged, and echoed to stdout in
/// pretty mode.
pub fn print_status(line: &str, format: OutputFormat) {
    info!("{line}");
    if matches!(format, OutputFormat::Pretty) {
        println!("{line}");
    }
}

/// The status line reporting the responder's reply.
pub fn received_line(received: &[String]) -> String {
    format!("{RECEIVED_PREFIX}{}", received.join("\n"))
}

pub fn print_raw_lines(lines: &[String]) {
    let mut out = std::io::stdout().lock();
    for line in lines {
        let _ = writeln!(out, "{line}");
    }
    let _ = out.flush();
}

fn exit_code_label(code: Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |code| code.to_string())
}
