//! Tests for uploads and downloads.

use camino::Utf8PathBuf;
use rstest::rstest;
use tempfile::TempDir;

use super::fixtures::{Harness, harness};
use crate::layout::UPLOAD_FOLDER;
use crate::node::NodeError;
use crate::transport::RemoteOutput;

#[rstest]
fn upload_as_root_stages_then_moves_under_sudo(harness: Harness) {
    harness
        .node
        .upload("/etc/neon/node.conf", b"role=manager\n", true)
        .expect("upload");

    let runs = harness.transport.runs();
    assert_eq!(runs.len(), 2, "{runs:#?}");
    let prepare = runs.first().expect("staging folder");
    assert!(
        prepare.ends_with(&format!("mkdir -p {UPLOAD_FOLDER} && chmod 700 {UPLOAD_FOLDER}")),
        "{prepare}"
    );
    let uploads = harness.transport.uploads();
    let (staged, contents) = uploads.first().expect("staged upload");
    assert!(staged.starts_with(&format!("{UPLOAD_FOLDER}/")), "{staged}");
    assert_eq!(contents.as_slice(), b"role=manager\n");

    let mv = runs.get(1).expect("move");
    assert!(
        mv.ends_with(&format!("sudo mkdir -p /etc/neon && sudo mv {staged} /etc/neon/node.conf")),
        "{mv}"
    );
}

#[rstest]
fn upload_target_is_passed_to_the_shell_literally(harness: Harness) {
    harness
        .node
        .upload("/srv/$HOME/`id` \"x\".conf", b"x", true)
        .expect("upload");

    let runs = harness.transport.runs();
    let mv = runs.get(1).expect("move");
    assert!(mv.contains("sudo mkdir -p '/srv/$HOME' && sudo mv "), "{mv}");
    assert!(mv.ends_with(" '/srv/$HOME/`id` \"x\".conf'"), "{mv}");
    assert!(!mv.contains("bash -c"), "{mv}");
}

#[rstest]
fn staging_folder_is_created_once_per_session(harness: Harness) {
    harness.node.upload("a.txt", b"a", false).expect("first");
    harness.node.upload("b.txt", b"b", false).expect("second");

    let runs = harness.transport.runs();
    assert_eq!(runs.len(), 3, "{runs:#?}");
    let staging_runs = runs
        .iter()
        .filter(|run| run.contains(&format!("chmod 700 {UPLOAD_FOLDER}")))
        .count();
    assert_eq!(staging_runs, 1);
    assert!(runs.iter().all(|run| !run.starts_with("sudo")), "{runs:#?}");
}

#[rstest]
fn upload_text_normalises_before_transfer(harness: Harness) {
    harness
        .node
        .upload_text("script.sh", "\u{feff}a\r\n\tb\rc", 4, false)
        .expect("upload");

    let uploads = harness.transport.uploads();
    let (_, contents) = uploads.first().expect("upload");
    assert_eq!(String::from_utf8_lossy(contents), "a\n    b\nc");
}

#[rstest]
fn faulted_session_refuses_file_transfer(harness: Harness) {
    harness.node.fault("broken");

    let upload = harness.node.upload("a.txt", b"a", false);
    let download = harness.node.download("a.txt");

    assert!(matches!(upload, Err(NodeError::Faulted { .. })));
    assert!(matches!(download, Err(NodeError::Faulted { .. })));
    assert_eq!(harness.transport.call_count(), 0);
}

#[rstest]
fn empty_upload_target_is_invalid(harness: Harness) {
    let err = harness.node.upload("  ", b"a", false).expect_err("invalid");

    assert!(matches!(err, NodeError::InvalidArgument(_)), "{err}");
    assert_eq!(harness.transport.call_count(), 0);
}

#[rstest]
fn failed_move_reports_step_error(harness: Harness) {
    harness.transport.push_run(RemoteOutput::success(""));
    harness
        .transport
        .push_run(RemoteOutput::failure(1, "Permission denied"));

    let err = harness
        .node
        .upload("/etc/shadow", b"x", false)
        .expect_err("move fails");

    assert!(
        matches!(err, NodeError::Step { ref message, .. } if message == "Permission denied"),
        "{err}"
    );
}

#[rstest]
fn download_text_decodes_remote_file(harness: Harness) {
    harness.transport.push_download("hello\n");

    let text = harness.node.download_text("/etc/hostname").expect("download");

    assert_eq!(text, "hello\n");
    assert!(harness.node.is_transfer_connected());
}

#[rstest]
fn download_to_creates_local_parents(harness: Harness) {
    let dir = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    let target = root.join("nested/deeper/hosts");
    harness.transport.push_download("127.0.0.1 localhost\n");

    harness
        .node
        .download_to("/etc/hosts", &target)
        .expect("download");

    let written = std::fs::read_to_string(&target).expect("read back");
    assert_eq!(written, "127.0.0.1 localhost\n");
}

#[rstest]
#[case(RemoteOutput::success(""), true)]
#[case(RemoteOutput::failure(1, ""), false)]
fn file_exists_maps_test_exit_code(harness: Harness, #[case] output: RemoteOutput, #[case] expected: bool) {
    harness.transport.push_run(output);

    let exists = harness.node.file_exists("/etc/neon/node.conf").expect("exists");

    assert_eq!(exists, expected);
    let runs = harness.transport.runs();
    let check = runs.first().expect("existence check");
    assert!(check.contains("test -f /etc/neon/node.conf"), "{check}");
    assert!(!harness.node.is_faulted());
}
