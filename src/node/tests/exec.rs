//! Tests for plain and elevated command execution.

use rstest::rstest;

use super::fixtures::{Harness, PATH_PREFIX, harness};
use crate::command_line::{CommandArg, REDACTED};
use crate::node::NodeError;
use crate::run_options::RunOptions;
use crate::transport::{RemoteOutput, TransportError};

#[rstest]
fn run_command_exports_path_once(harness: Harness) {
    harness
        .node
        .run_command("echo", &["hello".into()], RunOptions::NONE)
        .expect("run");

    let runs = harness.transport.runs();
    assert_eq!(runs, vec![format!("{PATH_PREFIX}echo hello")]);
}

#[rstest]
fn sudo_command_wraps_path_export_inside_bash(harness: Harness) {
    let response = harness
        .node
        .sudo_command("systemctl restart docker", &[], RunOptions::NONE)
        .expect("sudo");

    let expected = format!("sudo bash -c '{PATH_PREFIX}systemctl restart docker'");
    assert_eq!(harness.transport.runs(), vec![expected.clone()]);
    assert_eq!(response.command(), expected);
    assert_eq!(expected.matches("export PATH=").count(), 1);
}

#[rstest]
fn ignore_configured_path_skips_export(harness: Harness) {
    harness
        .node
        .run_command("uname", &["-a".into()], RunOptions::IGNORE_CONFIGURED_PATH)
        .expect("run");

    assert_eq!(harness.transport.runs(), vec![String::from("uname -a")]);
}

#[rstest]
fn sudo_with_single_quote_is_rejected_without_io(harness: Harness) {
    let err = harness
        .node
        .sudo_command("echo", &["it's".into()], RunOptions::NONE)
        .expect_err("quote must be rejected");

    assert!(matches!(err, NodeError::QuoteInSudoCommand { .. }), "{err}");
    assert_eq!(harness.transport.call_count(), 0);
}

#[rstest]
fn sudo_rejects_quoted_remote_path_before_connecting(harness: Harness) {
    let node = harness.node.with_remote_path("$PATH:/opt/it's");

    let err = node
        .sudo_command("uptime", &[], RunOptions::NONE)
        .expect_err("quoted path must be rejected");

    assert!(
        matches!(err, NodeError::QuoteInRemotePath { ref remote_path, .. } if remote_path == "$PATH:/opt/it's"),
        "{err}"
    );
    assert_eq!(harness.transport.call_count(), 0);
}

#[rstest]
fn quoted_remote_path_is_fine_outside_sudo_or_when_ignored(harness: Harness) {
    harness.transport.push_run(RemoteOutput::success("up"));
    harness.transport.push_run(RemoteOutput::success("up"));
    let node = harness.node.with_remote_path("$PATH:/opt/it's");

    node.run_command("uptime", &[], RunOptions::NONE).expect("plain run");
    node.sudo_command("uptime", &[], RunOptions::IGNORE_CONFIGURED_PATH)
        .expect("sudo without path export");

    assert_eq!(
        harness.transport.runs(),
        vec![
            String::from("export PATH=$PATH:/opt/it's && uptime"),
            String::from("sudo bash -c 'uptime'"),
        ]
    );
}

#[rstest]
fn fault_on_non_zero_exit_blocks_later_commands(harness: Harness) {
    harness.transport.push_run(RemoteOutput::failure(7, "boom"));

    let failed = harness
        .node
        .run_command("false", &[], RunOptions::FAULT_ON_NON_ZERO_EXIT)
        .expect("run");
    assert_eq!(failed.exit_code(), 7);
    assert!(harness.node.is_faulted());
    assert_eq!(harness.node.status(), "ERROR[7]");

    let calls_before = harness.transport.call_count();
    let rejected = harness
        .node
        .run_command("echo", &["again".into()], RunOptions::NONE)
        .expect("rejected response");
    assert!(rejected.session_was_faulted());
    assert_eq!(rejected.exit_code(), 1);
    assert!(rejected.output_text().is_none());
    assert_eq!(harness.transport.call_count(), calls_before);

    let forced = harness
        .node
        .run_command("echo", &["forced".into()], RunOptions::RUN_EVEN_IF_FAULTED)
        .expect("forced run");
    assert!(forced.is_success());
    assert!(!forced.session_was_faulted());
    assert!(harness.node.is_faulted(), "faults are permanent");
}

#[rstest]
fn plain_failure_only_warns(harness: Harness) {
    harness.transport.push_run(RemoteOutput::failure(3, "missing"));

    let response = harness
        .node
        .run_command("ls", &["/nope".into()], RunOptions::NONE)
        .expect("run");

    assert_eq!(response.exit_code(), 3);
    assert_eq!(response.error_text(), Some("missing"));
    assert!(!harness.node.is_faulted());
    assert_eq!(harness.node.status(), "WARN[3]");
}

#[rstest]
fn use_defaults_merges_session_defaults(harness: Harness) {
    let node = harness
        .node
        .with_default_options(RunOptions::FAULT_ON_NON_ZERO_EXIT);
    harness.transport.push_run(RemoteOutput::failure(2, ""));

    node.run_command("false", &[], RunOptions::USE_DEFAULTS)
        .expect("run");

    assert!(node.is_faulted());
}

#[rstest]
fn classified_commands_redact_arguments_and_output(harness: Harness) {
    harness
        .transport
        .push_run(RemoteOutput::failure(1, "denied token hunter2"));

    harness
        .node
        .sudo_command(
            "vault",
            &["login".into(), "hunter2".into()],
            RunOptions::CLASSIFIED,
        )
        .expect("run");

    let log = harness.log.contents();
    assert!(!log.contains("hunter2"), "secret leaked: {log}");
    assert!(log.contains(&format!("START: vault {REDACTED}")), "{log}");
    assert!(log.contains(&format!("    {REDACTED}")), "{log}");
    assert!(log.contains("END [ERROR=1]"), "{log}");
}

#[rstest]
fn log_only_on_error_stays_quiet_on_success(harness: Harness) {
    harness
        .node
        .run_command("true", &[], RunOptions::LOG_ONLY_ON_ERROR)
        .expect("run");

    assert!(harness.log.contents().is_empty(), "{}", harness.log.contents());
}

#[rstest]
fn log_only_on_error_logs_start_retroactively(harness: Harness) {
    harness.transport.push_run(RemoteOutput::failure(2, "bad flag"));

    harness
        .node
        .run_command("ls", &["-Z".into()], RunOptions::LOG_ONLY_ON_ERROR)
        .expect("run");

    assert_eq!(
        harness.log.lines(),
        vec![
            String::from("START: ls -Z"),
            String::from("STDERR:"),
            String::from("    bad flag"),
            String::from("END [ERROR=2]"),
        ]
    );
}

#[rstest]
fn log_output_records_stdout(harness: Harness) {
    harness.transport.push_run(RemoteOutput::success("line one\nline two\n"));

    harness
        .node
        .run_command("cat", &["notes".into()], RunOptions::LOG_OUTPUT)
        .expect("run");

    assert_eq!(
        harness.log.lines(),
        vec![
            String::from("START: cat notes"),
            String::from("STDOUT:"),
            String::from("    line one"),
            String::from("    line two"),
            String::from("END [OK]"),
        ]
    );
}

#[rstest]
fn binary_output_is_downloaded_and_removed(harness: Harness) {
    harness.transport.push_download(vec![0_u8, 159, 146, 150]);

    let response = harness
        .node
        .sudo_command("cat", &["/etc/neon/key.bin".into()], RunOptions::BINARY_OUTPUT)
        .expect("run");

    assert_eq!(response.output_binary(), Some(&[0_u8, 159, 146, 150][..]));
    assert!(response.output_text().is_none());
    let runs = harness.transport.runs();
    assert_eq!(runs.len(), 2);
    let first = runs.first().expect("command run");
    assert!(first.contains("cat /etc/neon/key.bin > /tmp/neon-"), "{first}");
    let cleanup = runs.get(1).expect("cleanup run");
    assert!(cleanup.starts_with("sudo rm -f /tmp/neon-"), "{cleanup}");
    assert!(harness.node.is_transfer_connected());
}

#[rstest]
fn transport_errors_propagate_unchanged(harness: Harness) {
    harness.transport.push_run_error(TransportError::Terminated {
        program: String::from("ssh"),
    });

    let err = harness
        .node
        .run_command("uptime", &[], RunOptions::NONE)
        .expect_err("transport failure");

    assert!(
        matches!(err, NodeError::Transport(TransportError::Terminated { .. })),
        "{err}"
    );
}

#[rstest]
fn absent_arguments_are_dropped(harness: Harness) {
    harness
        .node
        .run_command(
            "docker",
            &[
                "service".into(),
                CommandArg::from(None::<&str>),
                "create".into(),
                true.into(),
            ],
            RunOptions::IGNORE_CONFIGURED_PATH,
        )
        .expect("run");

    assert_eq!(
        harness.transport.runs(),
        vec![String::from("docker service create true")]
    );
}
