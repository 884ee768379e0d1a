use std::ffi::OsStr;
use std::process::{Command, Stdio};

use pipeduplex_transport::DuplexPipeServer;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PeerError, Result};
use crate::exchange::{Exchange, ExchangeConfig, ExchangeOutcome, Role};

/// Result of a completed initiator run.
#[derive(Debug, Clone, Serialize)]
pub struct InitiatorReport {
    /// OS process id of the responder.
    pub responder_pid: u32,
    /// Responder exit code, when it exited normally.
    pub responder_exit_code: Option<i32>,
    #[serde(flatten)]
    pub outcome: ExchangeOutcome,
}

/// Parent side: creates the pipe pair, spawns the responder and talks first.
///
/// The responder is started as `program [args...] <write-handle> <read-handle>`
/// with stdin closed; stdout and stderr are inherited.
pub struct Initiator {
    command: Command,
    program: String,
    config: ExchangeConfig,
}

impl Initiator {
    /// Prepare to spawn `program` as the responder.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        let program = program.as_ref();
        let mut command = Command::new(program);
        command.stdin(Stdio::null());
        Self {
            command,
            program: program.to_string_lossy().into_owned(),
            config: ExchangeConfig::default(),
        }
    }

    /// Add an argument placed before the pipe handles.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.command.arg(arg);
        self
    }

    /// Override exchange config.
    pub fn with_exchange_config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    /// Access the responder command before it is spawned.
    pub fn command_mut(&mut self) -> &mut Command {
        &mut self.command
    }

    /// Spawn the responder, send `outgoing`, receive its reply, and wait for
    /// it to exit.
    pub fn run<S: AsRef<str>>(self, outgoing: &[S]) -> Result<InitiatorReport> {
        let outgoing: Vec<String> = outgoing.iter().map(|s| s.as_ref().to_string()).collect();
        self.run_with(move || outgoing)
    }

    /// Like [`Initiator::run`], but builds the outgoing message once the
    /// responder is running, right before it is sent.
    ///
    /// The responder is always waited on, including when the exchange
    /// fails. If the exchange timed out the responder is killed first.
    /// Only the responder itself is killed; processes it started are not.
    pub fn run_with<F>(mut self, compose: F) -> Result<InitiatorReport>
    where
        F: FnOnce() -> Vec<String>,
    {
        let mut pipes = DuplexPipeServer::create()?;
        pipes.configure_command(&mut self.command)?;

        let mut child = self.command.spawn().map_err(|source| PeerError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let responder_pid = child.id();
        info!(pid = responder_pid, program = %self.program, "started responder process");

        pipes.release_local_client_copy();
        let exchange = Exchange::from_pipes(pipes.into_ends(), Role::Initiator, self.config);
        let result = exchange.run_with(|_| compose());

        if let Err(PeerError::Timeout(timeout)) = &result {
            warn!(pid = responder_pid, ?timeout, "exchange timed out; killing responder");
            if let Err(err) = child.kill() {
                warn!(pid = responder_pid, error = %err, "failed to kill responder");
            }
        }
        let status = child.wait();

        let outcome = result?;
        let status = status.map_err(PeerError::Wait)?;
        info!(pid = responder_pid, %status, "responder exited");
        if !status.success() {
            return Err(PeerError::ResponderFailed(status));
        }

        Ok(InitiatorReport {
            responder_pid,
            responder_exit_code: status.code(),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::exchange::EofPolicy;

    /// A shell responder that reads the message and replies, speaking the
    /// wire format directly. `$1` is its write handle, `$2` its read handle.
    const SHELL_RESPONDER: &str = r#"
        while IFS= read -r line <&"$2"; do
            case "$line" in SYNC*) break ;; esac
        done
        while IFS= read -r line <&"$2"; do
            case "$line" in END*) break ;; esac
        done
        printf 'SYNC\n' >&"$1"
        printf 'Hello from Process B!\nEND\n' >&"$1"
    "#;

    fn shell(script: &str) -> Initiator {
        Initiator::new("/bin/sh").arg("-c").arg(script).arg("responder")
    }

    #[test]
    fn exchanges_with_spawned_shell_responder() {
        let report = shell(SHELL_RESPONDER)
            .run(&["Hello from Process A!"])
            .unwrap();

        assert_eq!(report.outcome.sent, ["Hello from Process A!"]);
        assert_eq!(report.outcome.received, ["Hello from Process B!"]);
        assert_eq!(report.responder_exit_code, Some(0));
    }

    #[test]
    fn responder_exiting_without_reply_is_incomplete() {
        let script = r#"while IFS= read -r line <&"$2"; do case "$line" in END*) exit 0 ;; esac; done"#;
        let err = shell(script).run(&["ping"]).unwrap_err();
        assert!(matches!(err, PeerError::Incomplete { .. }));
    }

    #[test]
    fn implicit_end_accepts_truncated_reply() {
        let script = r#"
            while IFS= read -r line <&"$2"; do case "$line" in END*) break ;; esac; done
            printf 'SYNC\npartial\n' >&"$1"
        "#;
        let report = shell(script)
            .with_exchange_config(ExchangeConfig {
                eof_policy: EofPolicy::ImplicitEnd,
                ..ExchangeConfig::default()
            })
            .run(&["ping"])
            .unwrap();
        assert_eq!(report.outcome.received, ["partial"]);
    }

    #[test]
    fn failing_responder_is_reported() {
        let script = r#"
            while IFS= read -r line <&"$2"; do case "$line" in END*) break ;; esac; done
            printf 'SYNC\nEND\n' >&"$1"
            exit 3
        "#;
        let err = shell(script).run(&["ping"]).unwrap_err();
        assert!(matches!(err, PeerError::ResponderFailed(status) if status.code() == Some(3)));
    }

    #[test]
    fn unresponsive_responder_times_out_and_is_reaped() {
        let err = shell("exec sleep 30")
            .with_exchange_config(ExchangeConfig {
                timeout: Some(Duration::from_millis(100)),
                ..ExchangeConfig::default()
            })
            .run(&["ping"])
            .unwrap_err();
        assert!(matches!(err, PeerError::Timeout(_)));
    }

    #[test]
    fn command_mut_configures_the_responder() {
        let script = r#"
            while IFS= read -r line <&"$2"; do case "$line" in END*) break ;; esac; done
            printf 'SYNC\n%s\nEND\n' "$REPLY_TEXT" >&"$1"
        "#;
        let mut initiator = shell(script);
        initiator.command_mut().env("REPLY_TEXT", "set by the parent");

        let report = initiator.run(&["ping"]).unwrap();
        assert_eq!(report.outcome.received, ["set by the parent"]);
    }

    #[test]
    fn run_with_composes_after_spawn() {
        let report = shell(SHELL_RESPONDER)
            .run_with(|| vec!["composed".to_string()])
            .unwrap();
        assert_eq!(report.outcome.sent, ["composed"]);
        assert_eq!(report.outcome.received, ["Hello from Process B!"]);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = Initiator::new("/nonexistent/pipeduplex-responder")
            .run(&["ping"])
            .unwrap_err();
        assert!(matches!(err, PeerError::Spawn { .. }));
    }
}
