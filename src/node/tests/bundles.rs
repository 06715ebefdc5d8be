//! Tests for command-bundle execution.

use rstest::rstest;

use super::fixtures::{Harness, harness};
use crate::bundle::{BundleFile, CommandBundle, LAUNCHER_NAME, unpack_archive};
use crate::layout::EXEC_FOLDER;
use crate::node::NodeError;
use crate::run_options::RunOptions;
use crate::transport::RemoteOutput;

fn setup_bundle() -> CommandBundle {
    CommandBundle::new("./setup.sh", vec!["--mode".into(), "fast".into()])
        .with_file(BundleFile::text("setup.sh", "#!/bin/sh\necho ok\n", true))
        .with_file(BundleFile::text("settings.conf", "a=1\n", false))
}

#[rstest]
fn run_bundle_uploads_unpacks_runs_and_cleans_up(harness: Harness) {
    harness
        .node
        .run_bundle(&setup_bundle(), RunOptions::NONE)
        .expect("bundle run");

    let runs = harness.transport.runs();
    assert_eq!(runs.len(), 4, "{runs:#?}");
    let create = runs.first().expect("create step");
    assert!(create.starts_with("sudo bash -c '"), "{create}");
    assert!(create.contains(&format!("mkdir -p {EXEC_FOLDER}/")), "{create}");
    assert!(create.contains("&& chmod 777 "), "{create}");

    let unpack = runs.get(1).expect("unpack step");
    assert!(!unpack.starts_with("sudo"), "{unpack}");
    assert!(unpack.contains("unzip -o -q __bundle.zip"), "{unpack}");
    assert!(unpack.contains(&format!("chmod 700 {LAUNCHER_NAME}")), "{unpack}");

    let launch = runs.get(2).expect("launch");
    assert!(launch.ends_with(&format!("&& ./{LAUNCHER_NAME}")), "{launch}");

    let cleanup = runs.get(3).expect("cleanup");
    assert!(cleanup.contains(&format!("rm -rf {EXEC_FOLDER}/")), "{cleanup}");

    let uploads = harness.transport.uploads();
    let (path, archive) = uploads.first().expect("archive upload");
    assert!(path.starts_with(EXEC_FOLDER) && path.ends_with("/__bundle.zip"), "{path}");
    let files = unpack_archive(archive).expect("unpack");
    let names: Vec<&str> = files.iter().map(|file| file.path.as_str()).collect();
    assert_eq!(names, vec!["setup.sh", "settings.conf", LAUNCHER_NAME]);
    let launcher = files.last().expect("launcher");
    let script = String::from_utf8_lossy(&launcher.bytes);
    assert!(script.contains("chmod 707 setup.sh\n"), "{script}");
    assert!(script.ends_with("./setup.sh --mode fast\n"), "{script}");
}

#[rstest]
fn bundle_start_line_cites_entry_command_once(harness: Harness) {
    harness
        .node
        .run_bundle(&setup_bundle(), RunOptions::NONE)
        .expect("bundle run");

    let starts: Vec<String> = harness
        .log
        .lines()
        .into_iter()
        .filter(|line| line.starts_with("START:"))
        .collect();
    assert_eq!(starts, vec![String::from("START: ./setup.sh --mode fast")]);
}

#[rstest]
fn sudo_bundle_allows_quotes_and_uses_bash(harness: Harness) {
    let bundle = CommandBundle::new("echo", vec!["it's fine".into()])
        .with_file(BundleFile::text("tool.sh", "true\n", true));

    harness
        .node
        .sudo_bundle(&bundle, RunOptions::NONE)
        .expect("bundle run");

    let runs = harness.transport.runs();
    let launch = runs.get(2).expect("launch");
    assert!(launch.starts_with("sudo bash -c '"), "{launch}");
    assert!(launch.contains(&format!("/bin/bash ./{LAUNCHER_NAME}")), "{launch}");
    let uploads = harness.transport.uploads();
    let (_, archive) = uploads.first().expect("archive upload");
    let files = unpack_archive(archive).expect("unpack");
    let launcher = files.last().expect("launcher");
    let script = String::from_utf8_lossy(&launcher.bytes);
    assert!(script.contains("chmod 700 tool.sh\n"), "{script}");
}

#[rstest]
fn failed_unpack_still_removes_folder(harness: Harness) {
    harness.transport.push_run(RemoteOutput::success(""));
    harness
        .transport
        .push_run(RemoteOutput::failure(9, "unzip: command not found"));

    let err = harness
        .node
        .run_bundle(&setup_bundle(), RunOptions::NONE)
        .expect_err("unpack failure");

    assert!(matches!(err, NodeError::Step { exit_code: 9, .. }), "{err}");
    let runs = harness.transport.runs();
    let last = runs.last().expect("cleanup");
    assert!(last.contains(&format!("rm -rf {EXEC_FOLDER}/")), "{last}");
}

#[rstest]
fn faulted_session_rejects_bundle_without_io(harness: Harness) {
    harness.node.fault("earlier failure");

    let response = harness
        .node
        .run_bundle(&setup_bundle(), RunOptions::NONE)
        .expect("rejected response");

    assert!(response.session_was_faulted());
    assert_eq!(harness.transport.call_count(), 0);
}

#[rstest]
fn invalid_bundle_is_rejected_before_io(harness: Harness) {
    let bundle = CommandBundle::new("./run.sh", Vec::new());

    let err = harness
        .node
        .run_bundle(&bundle, RunOptions::NONE)
        .expect_err("no files");

    assert!(matches!(err, NodeError::Bundle(_)), "{err}");
    assert_eq!(harness.transport.call_count(), 0);
}
