#![cfg(all(any(target_os = "linux", target_os = "android"), feature = "cli"))]

use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

/// Reads the initiator's message, then replies "shell reply".
/// `$1` is the write handle, `$2` the read handle.
const SHELL_RESPONDER: &str = r#"
    while IFS= read -r line <&"$2"; do case "$line" in SYNC*) break ;; esac; done
    while IFS= read -r line <&"$2"; do case "$line" in END*) break ;; esac; done
    printf 'SYNC\nshell reply\nEND\n' >&"$1"
"#;

fn pipeduplex(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pipeduplex"))
        .env_remove("PIPEDUPLEX_TIMEOUT")
        .args(["--log-level", "error"])
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("pipeduplex should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn initiate_prints_status_lines_and_reply() {
    let output = pipeduplex(&["--format", "pretty", "initiate", "--timeout", "10s"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        stdout(&output),
        "Started application (Process A)...\n\
         Started other process (Process B)...\n\
         Sending message to Process B...\n\
         Received message from Process B: Hello from Process B!\n"
    );
}

#[test]
fn initiate_json_reports_both_directions() {
    let output = pipeduplex(&[
        "--format", "json", "initiate", "-m", "first", "-m", "", "-m", "SYNC again", "--timeout", "10s",
    ]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("stdout should be JSON");
    assert_eq!(report["role"], "initiator");
    assert_eq!(report["sent"], serde_json::json!(["first", "", "SYNC again"]));
    assert_eq!(report["received"], serde_json::json!(["Hello from Process B!"]));
    assert_eq!(report["responder_exit_code"], 0);
    assert!(report["responder_pid"].as_u64().is_some());
}

#[test]
fn initiate_with_custom_responder_program() {
    let output = pipeduplex(&[
        "--format",
        "raw",
        "initiate",
        "--responder",
        "/bin/sh",
        "--responder-arg",
        "-c",
        "--responder-arg",
        SHELL_RESPONDER,
        "--responder-arg",
        "responder",
        "--timeout",
        "10s",
    ]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout(&output), "shell reply\n");
}

#[test]
fn respond_with_fewer_than_two_handles_does_nothing() {
    for args in [&["respond"][..], &["respond", "5"][..]] {
        let output = pipeduplex(args);
        assert_eq!(output.status.code(), Some(0));
        assert!(output.stdout.is_empty());
        assert!(output.stderr.is_empty());
    }
}

#[test]
fn respond_rejects_malformed_handles_with_usage_code() {
    let output = pipeduplex(&["respond", "write", "read"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid pipe handle"));

    let output = pipeduplex(&["respond", "999999", "999998"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn failing_responder_exits_non_zero() {
    let script = format!("{SHELL_RESPONDER}\nexit 3");
    let output = pipeduplex(&[
        "initiate",
        "--responder",
        "/bin/sh",
        "--responder-arg",
        "-c",
        "--responder-arg",
        &script,
        "--responder-arg",
        "responder",
    ]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn responder_closing_early_is_a_protocol_error() {
    let output = pipeduplex(&[
        "initiate",
        "--responder",
        "/bin/sh",
        "--responder-arg",
        "-c",
        "--responder-arg",
        r#"while IFS= read -r line <&"$2"; do case "$line" in END*) exit 0 ;; esac; done"#,
        "--responder-arg",
        "responder",
    ]);

    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn unresponsive_responder_times_out_with_124() {
    let started = Instant::now();
    let output = pipeduplex(&[
        "initiate",
        "--responder",
        "/bin/sh",
        "--responder-arg",
        "-c",
        "--responder-arg",
        "exec sleep 30",
        "--timeout",
        "200ms",
    ]);

    assert_eq!(output.status.code(), Some(124));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn invalid_timeout_from_environment_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_pipeduplex"))
        .env("PIPEDUPLEX_TIMEOUT", "soon")
        .args(["--log-level", "error", "initiate"])
        .output()
        .expect("pipeduplex should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = pipeduplex(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        format!("pipeduplex {}\n", env!("CARGO_PKG_VERSION"))
    );
}
