//! Integration tests for library scanning and build selection
//!
//! These tests verify:
//! - Discovery of `<branch>/<build>` folders with `.blinfo` records
//! - Skipping of folders without or with damaged records
//! - Version queries applied to a scanned library
//! - Library tasks (write, rename, remove) run through the task queue

use blauncher::query::select_builds;
use blauncher::services::{LibraryError, read_build_info, scan_library, write_build_info};
use blauncher::tasks::{RemoveTask, RenameTask, WriteBuildInfoTask};
use blauncher::{BuildInfo, BuildVersion, QueueConfig, QueueEvent, TaskOutput, TaskQueue, VersionSearchQuery};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{TimeZone, Utc};
use std::fs;
use tempfile::TempDir;
use tokio::time::{Duration, timeout};

fn create_library() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, root)
}

fn install(root: &Utf8Path, branch: &str, version: &str, hash: &str, day: u32) -> BuildInfo {
    let folder = root.join(branch).join(format!("build-{}-{}", version, hash));
    fs::create_dir_all(&folder).unwrap();

    let info = BuildInfo {
        folder: folder.clone(),
        version: version.parse().unwrap(),
        branch: branch.to_string(),
        build_hash: Some(hash.to_string()),
        commit_time: Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap(),
        custom_name: String::new(),
        is_favorite: false,
    };
    write_build_info(&folder, &info).unwrap();
    info
}

fn versions(builds: &[&BuildInfo]) -> Vec<String> {
    builds.iter().map(|b| format!("{}-{}", b.version, b.branch)).collect()
}

#[test]
fn test_scan_finds_installed_builds() {
    let (_temp_dir, root) = create_library();
    install(&root, "stable", "4.1.0", "aaa", 1);
    install(&root, "stable", "4.2.0", "bbb", 2);
    install(&root, "daily", "4.3.0", "ccc", 3);

    let builds = scan_library(&root).unwrap();
    assert_eq!(builds.len(), 3);

    // Sorted by folder, so `daily` comes first
    assert_eq!(builds[0].branch, "daily");
    assert!(builds.iter().all(|b| b.folder.starts_with(&root)));
}

#[test]
fn test_scan_skips_unrecognized_folders() {
    let (_temp_dir, root) = create_library();
    install(&root, "stable", "4.1.0", "aaa", 1);

    // No record at all
    fs::create_dir_all(root.join("stable").join("not-a-build")).unwrap();
    // Damaged record
    let broken = root.join("stable").join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join(".blinfo"), "{ nope").unwrap();
    // Loose file at branch level
    fs::write(root.join("stable").join("notes.txt"), "hello").unwrap();

    let builds = scan_library(&root).unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].version, BuildVersion::new(4, 1, 0));
}

#[test]
fn test_scan_missing_root_is_error() {
    let (_temp_dir, root) = create_library();
    let missing = root.join("does-not-exist");

    assert!(matches!(scan_library(&missing), Err(LibraryError::Io { .. })));
}

#[test]
fn test_query_against_scanned_library() {
    let (_temp_dir, root) = create_library();
    install(&root, "stable", "4.1.0", "aaa", 1);
    install(&root, "stable", "4.2.0", "bbb", 2);
    install(&root, "stable", "4.2.1", "ccc", 3);
    install(&root, "lts", "3.6.5", "ddd", 4);
    install(&root, "daily", "4.3.0", "eee", 5);
    install(&root, "daily", "4.3.0", "fff", 6);

    let builds = scan_library(&root).unwrap();
    let run = |text: &str| -> Vec<String> {
        let query = VersionSearchQuery::parse(text).unwrap();
        versions(&select_builds(&builds, &query))
    };

    assert_eq!(run("3.^.^"), vec!["3.6.5-lts"]);
    assert_eq!(run("4.2.*").len(), 2);
    assert_eq!(run("-.-.-"), vec!["3.6.5-lts"]);
    assert!(run("5.*.*").is_empty());

    // Two daily builds share 4.3.0; the newest commit wins
    let newest = VersionSearchQuery::latest().with_commit_time("^").unwrap();
    let selected = select_builds(&builds, &newest);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].build_hash.as_deref(), Some("fff"));

    let by_hash = VersionSearchQuery::any().with_build_hash("eee");
    let selected = select_builds(&builds, &by_hash);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].branch, "daily");

    // Version fields narrow first: the latest version is a daily build
    let latest_stable = VersionSearchQuery::latest().with_branch("stable");
    assert!(select_builds(&builds, &latest_stable).is_empty());

    let on_stable = VersionSearchQuery::parse("4.2.^").unwrap().with_branch("stable");
    assert_eq!(versions(&select_builds(&builds, &on_stable)), vec!["4.2.1-stable"]);
}

#[test]
fn test_record_survives_folder_rename() {
    let (_temp_dir, root) = create_library();
    let info = install(&root, "stable", "4.1.0", "aaa", 1);

    let moved = root.join("stable").join("renamed");
    fs::rename(&info.folder, &moved).unwrap();

    let read = read_build_info(&moved).unwrap();
    assert_eq!(read.folder, moved);
    assert_eq!(read.version, info.version);
}

#[tokio::test]
async fn test_library_tasks_through_queue() {
    let (_temp_dir, root) = create_library();
    let old = install(&root, "stable", "4.0.0", "old", 1);
    let keep = install(&root, "stable", "4.1.0", "keep", 2);

    let staged = root.join("stable").join("staged");
    fs::create_dir_all(&staged).unwrap();
    let staged_info = BuildInfo {
        folder: staged.clone(),
        ..keep.clone()
    };
    let renamed = root.join("stable").join("4.1.0-copy");

    let queue = TaskQueue::new(QueueConfig {
        worker_count: 1,
        poll_interval: Duration::from_millis(20),
        ..QueueConfig::default()
    });
    let mut rx = queue.subscribe();

    queue.append(RemoveTask::new(old.folder.clone())).unwrap();
    queue.append(WriteBuildInfoTask::new(staged_info)).unwrap();
    queue.append(RenameTask::new(staged.clone(), renamed.clone())).unwrap();
    queue.start().unwrap();

    let mut outputs = Vec::new();
    while outputs.len() < 3 {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Channel closed");
        match event {
            QueueEvent::Finished { output, .. } => outputs.push(output),
            QueueEvent::Failed { task, error, .. } => panic!("{} failed: {}", task, error),
            _ => {}
        }
    }

    // One worker, so outcomes arrive in submission order
    assert_eq!(outputs[0], TaskOutput::Removed(old.folder.clone()));
    assert!(matches!(outputs[1], TaskOutput::Written(_)));
    assert_eq!(outputs[2], TaskOutput::Renamed(renamed.clone()));

    let builds = scan_library(&root).unwrap();
    let folders: Vec<&Utf8Path> = builds.iter().map(|b| b.folder.as_path()).collect();
    assert_eq!(folders, vec![renamed.as_path(), keep.folder.as_path()]);
}
