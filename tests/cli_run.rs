//! Behavioural tests for the `neon run` and `neon sudo` CLI.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn cli_run_propagates_exit_code_and_streams_output() {
    let mut cmd = cargo_bin_cmd!("neon");
    cmd.env("NEON_FAKE_RUN_ENABLE", "1");
    cmd.env("NEON_FAKE_RUN_MODE", "exit-7");
    cmd.args(["run", "--host", "10.0.0.10", "--", "echo", "ok"]);

    cmd.assert()
        .code(7)
        .stdout(contains("fake-stdout"))
        .stderr(contains("fake-stderr"));
}

#[test]
fn cli_sudo_succeeds_in_fake_mode() {
    let mut cmd = cargo_bin_cmd!("neon");
    cmd.env("NEON_FAKE_RUN_ENABLE", "1");
    cmd.env("NEON_FAKE_RUN_MODE", "exit-0");
    cmd.env("NEON_HOST", "10.0.0.10");
    cmd.args(["sudo", "--classified", "--", "systemctl", "status", "docker"]);

    cmd.assert().success().stdout(contains("fake-stdout"));
}

#[test]
fn cli_run_reports_faulted_node() {
    let mut cmd = cargo_bin_cmd!("neon");
    cmd.env("NEON_FAKE_RUN_ENABLE", "1");
    cmd.env("NEON_FAKE_RUN_MODE", "faulted");
    cmd.args(["run", "--host", "10.0.0.10", "--", "uptime"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("is faulted"));
}

#[test]
fn cli_run_requires_a_host() {
    let mut cmd = cargo_bin_cmd!("neon");
    cmd.env_remove("NEON_HOST");
    cmd.args(["run", "--", "uptime"]);

    cmd.assert().failure().stderr(contains("--host"));
}

#[test]
fn cli_run_rejects_control_characters() {
    let mut cmd = cargo_bin_cmd!("neon");
    cmd.args(["run", "--host", "10.0.0.10", "--", "echo", "a\tb"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("control characters"));
}
