//! End-to-end node session behaviour against the local shell.
//!
//! `LocalShellTransport` executes the exact command lines a real host would
//! receive, so these tests exercise quoting, staging, and bundle deployment
//! without an SSH server.

use std::process::Command;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use neon::test_support::LocalShellTransport;
use neon::{BundleFile, CommandBundle, NodeProxy, RunOptions};

struct LocalNode {
    node: NodeProxy<(), LocalShellTransport>,
    home: Utf8PathBuf,
    _dir: TempDir,
}

#[fixture]
fn local() -> LocalNode {
    let dir = TempDir::new().expect("tempdir");
    let home = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
    let exec_root = home.join("exec");
    let node = NodeProxy::new("local", "127.0.0.1", (), LocalShellTransport::new(home.clone()))
        .with_exec_root(exec_root.as_str());
    LocalNode {
        node,
        home,
        _dir: dir,
    }
}

fn unzip_available() -> bool {
    Command::new("unzip")
        .arg("-v")
        .output()
        .is_ok_and(|output| output.status.success())
}

#[rstest]
fn echo_returns_output_and_zero_exit(local: LocalNode) {
    let response = local
        .node
        .run_command("echo", &["hello".into()], RunOptions::NONE)
        .expect("echo");

    assert_eq!(response.exit_code(), 0);
    assert_eq!(response.output_text(), Some("hello\n"));
    assert!(!local.node.is_faulted());
}

#[rstest]
fn spaced_arguments_arrive_as_one_word(local: LocalNode) {
    let response = local
        .node
        .sudo_command("printf", &["%s:".into(), "a b".into(), "c".into()], RunOptions::NONE)
        .expect("printf");

    assert_eq!(response.output_text(), Some("a b:c:"));
}

#[rstest]
fn failing_command_faults_only_when_asked(local: LocalNode) {
    let quiet = local
        .node
        .run_command("false", &[], RunOptions::NONE)
        .expect("false");
    assert_eq!(quiet.exit_code(), 1);
    assert!(!local.node.is_faulted());

    local
        .node
        .run_command("false", &[], RunOptions::FAULT_ON_NON_ZERO_EXIT)
        .expect("false");
    assert!(local.node.is_faulted());

    let skipped = local
        .node
        .run_command("echo", &["never".into()], RunOptions::NONE)
        .expect("skipped");
    assert!(skipped.session_was_faulted());
    assert_eq!(skipped.output_text(), None);
}

#[rstest]
fn binary_output_is_captured_byte_for_byte(local: LocalNode) {
    let response = local
        .node
        .run_command("printf", &["\\001\\002 \\377".into()], RunOptions::BINARY_OUTPUT)
        .expect("binary");

    assert_eq!(response.output_binary(), Some([1_u8, 2, b' ', 255].as_slice()));
    assert_eq!(response.output_text(), None);
}

#[rstest]
fn uploaded_file_lands_at_target_and_reads_back(local: LocalNode) {
    let target = local.home.join("etc/neon/node.conf");

    local
        .node
        .upload_text(target.as_str(), "\u{feff}role=worker\r\n", 0, true)
        .expect("upload");

    assert!(local.node.file_exists(target.as_str()).expect("exists"));
    assert_eq!(
        local.node.download_text(target.as_str()).expect("download"),
        "role=worker\n"
    );
    let staged = std::fs::read_dir(local.home.join(".upload")).expect("staging folder");
    assert_eq!(staged.count(), 0);
}

#[rstest]
fn bundle_runs_in_scratch_folder_and_is_removed(local: LocalNode) {
    if !unzip_available() {
        return;
    }
    let bundle = CommandBundle::new("./setup.sh", vec!["--mode".into(), "fast".into()])
        .with_file(BundleFile::text(
            "setup.sh",
            "#!/bin/sh\necho \"mode $2\"\ncat settings.conf\n",
            true,
        ))
        .with_file(BundleFile::text("settings.conf", "a=1\n", false));

    let response = local
        .node
        .run_bundle(&bundle, RunOptions::NONE)
        .expect("bundle");

    assert_eq!(response.exit_code(), 0, "{:?}", response.error_text());
    assert_eq!(response.output_text(), Some("mode fast\na=1\n"));
    let leftovers = std::fs::read_dir(local.home.join("exec")).expect("exec root");
    assert_eq!(leftovers.count(), 0);
}

#[rstest]
fn single_script_bundle_prints_ok(local: LocalNode) {
    if !unzip_available() {
        return;
    }
    // The launcher runs from the extraction folder, which is not on PATH,
    // so the entry command names the script relative to it.
    let bundle = CommandBundle::new("./run.sh", Vec::new())
        .with_file(BundleFile::text("run.sh", "#!/bin/sh\necho ok", true));

    let response = local
        .node
        .run_bundle(&bundle, RunOptions::NONE)
        .expect("bundle");

    assert_eq!(response.exit_code(), 0, "{:?}", response.error_text());
    assert!(
        response.output_text().is_some_and(|out| out.contains("ok")),
        "{:?}",
        response.output_text()
    );
}

#[rstest]
fn upload_target_with_shell_syntax_is_written_literally(local: LocalNode) {
    let target = local.home.join("odd $HOME dir/it's `id`.conf");

    local
        .node
        .upload(target.as_str(), b"literal", true)
        .expect("upload");

    assert_eq!(std::fs::read(&target).expect("target"), b"literal");
}
