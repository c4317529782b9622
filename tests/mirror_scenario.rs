use std::path::{Path, PathBuf};

use mirrorpilot::MirrorError;
use mirrorpilot::app::run_once;
use mirrorpilot::mirror::MirrorStats;
use mirrorpilot::transport::memory::{MemoryRemote, Op};

fn make_tmp_dir(tag: &str) -> PathBuf {
    let mut base = std::env::temp_dir();
    base.push(format!(
        "mirrorpilot_{}_{}_{}",
        tag,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    std::fs::create_dir_all(&base).expect("create tmp dir");
    base
}

fn run(remote: &MemoryRemote, root: &str, local: &Path, delete: bool) -> MirrorStats {
    let mut conn = remote.clone();
    run_once(&mut conn, root, local, delete).expect("run completes")
}

#[test]
fn data_root_with_file_and_empty_subdirectory() {
    let local = make_tmp_dir("scenario");
    let remote = MemoryRemote::new();
    remote.add_file("/data/a.txt", b"hello").add_dir("/data/empty");

    let stats = run(&remote, "/data", &local, true);

    assert_eq!(std::fs::read(local.join("a.txt")).expect("fetched"), b"hello");
    assert!(local.join("empty").is_dir());
    assert!(!remote.has_dir("/data/empty"));
    assert!(!remote.has_file("/data/a.txt"));
    assert!(remote.has_dir("/data"));
    assert_eq!(stats.files_fetched, 1);
    assert_eq!(stats.remote_files_deleted, 1);
    assert_eq!(stats.remote_dirs_deleted, 1);
    assert!(stats.failures.is_empty());

    let ops = remote.ops();
    let fetch = ops.iter().position(|op| *op == Op::Fetch("/data/a.txt".into()));
    let delete = ops.iter().position(|op| *op == Op::DeleteFile("/data/a.txt".into()));
    assert!(fetch.is_some() && delete.is_some() && fetch < delete);
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn without_deletion_remote_file_stays() {
    let local = make_tmp_dir("keep");
    let remote = MemoryRemote::new();
    remote.add_file("/data/a.txt", b"hello").add_dir("/data/empty");

    let stats = run(&remote, "/data", &local, false);
    assert_eq!(stats.files_fetched, 1);
    assert!(remote.has_file("/data/a.txt"));
    // empty-directory cleanup does not depend on the file policy
    assert!(!remote.has_dir("/data/empty"));
    assert_eq!(remote.count(|op| matches!(op, Op::DeleteFile(_))), 0);
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn second_run_fetches_nothing() {
    let local = make_tmp_dir("idem");
    let remote = MemoryRemote::new();
    remote
        .add_file("/data/a.txt", b"a")
        .add_file("/data/x/b.txt", b"b")
        .add_file("/data/x/y/c.txt", b"c");

    let first = run(&remote, "/data", &local, false);
    assert_eq!(first.files_fetched, 3);

    remote.clear_ops();
    let second = run(&remote, "/data", &local, false);
    assert_eq!(second.files_fetched, 0);
    assert_eq!(second.files_skipped, 3);
    assert!(remote.fetches().is_empty());
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn failed_empty_directory_removal_is_not_fatal() {
    let local = make_tmp_dir("rmdirfail");
    let remote = MemoryRemote::new();
    remote
        .add_dir("/data/e")
        .add_file("/data/z.txt", b"z")
        .fail_remove("/data/e");

    let stats = run(&remote, "/data", &local, true);
    assert!(remote.has_dir("/data/e"));
    assert!(local.join("e").is_dir());
    assert!(local.join("z.txt").is_file());
    assert!(!remote.has_file("/data/z.txt"));
    assert_eq!(stats.files_fetched, 1);
    assert_eq!(stats.remote_dirs_deleted, 0);
    assert!(matches!(stats.failures.as_slice(), [MirrorError::Removal(p, _)] if p == "/data/e"));
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn empty_root_is_never_removed() {
    let local = make_tmp_dir("root");
    let remote = MemoryRemote::new();
    remote.add_dir("/data");

    let stats = run(&remote, "/data", &local, true);
    assert!(remote.has_dir("/data"));
    assert_eq!(stats.remote_dirs_deleted, 0);
    assert_eq!(remote.count(|op| matches!(op, Op::DeleteDir(_))), 0);
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn drained_directory_is_removed_on_the_next_run() {
    let local = make_tmp_dir("drain");
    let remote = MemoryRemote::new();
    remote.add_file("/data/sub/a.txt", b"a");

    run(&remote, "/data", &local, true);
    // emptied during this run, but it was not empty when listed
    assert!(remote.has_dir("/data/sub"));
    assert!(!remote.has_file("/data/sub/a.txt"));

    let stats = run(&remote, "/data", &local, true);
    assert!(!remote.has_dir("/data/sub"));
    assert_eq!(stats.remote_dirs_deleted, 1);
    assert!(local.join("sub").join("a.txt").exists());
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn remote_copy_removed_only_when_local_copy_exists() {
    let local = make_tmp_dir("safety");
    let remote = MemoryRemote::new();
    remote
        .add_file("/data/ok.txt", b"1")
        .add_file("/data/broken.txt", b"2")
        .add_file("/data/nested/deep.txt", b"3")
        .fail_fetch("/data/broken.txt")
        .fail_fetch("/data/nested/deep.txt");

    let stats = run(&remote, "/data", &local, true);
    for op in remote.ops() {
        if let Op::DeleteFile(path) = op {
            let rel = path.trim_start_matches("/data/");
            assert!(local.join(rel).is_file(), "{} deleted without a local copy", path);
        }
    }
    assert!(remote.has_file("/data/broken.txt"));
    assert!(remote.has_file("/data/nested/deep.txt"));
    assert!(!remote.has_file("/data/ok.txt"));
    assert_eq!(stats.failures.len(), 2);
    assert!(stats.failures.iter().all(|f| matches!(f, MirrorError::Transfer(..))));
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn every_remote_directory_exists_locally() {
    let local = make_tmp_dir("shape");
    let remote = MemoryRemote::new();
    remote
        .add_dir("/data/a/b/c")
        .add_file("/data/a/f.txt", b"f")
        .add_dir("/data/d");

    run(&remote, "/data", &local, false);
    for rel in ["a", "a/b", "a/b/c", "d"] {
        assert!(local.join(rel).is_dir(), "missing local dir {}", rel);
    }
    assert!(local.join("a").join("f.txt").is_file());
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn inaccessible_subtree_does_not_stop_siblings() {
    let local = make_tmp_dir("isolate");
    let remote = MemoryRemote::new();
    remote
        .add_file("/data/locked/secret.txt", b"s")
        .add_file("/data/open/b.txt", b"b")
        .add_file("/data/z.txt", b"z")
        .fail_change_dir("/data/locked")
        .fail_list("/data/open");

    let stats = run(&remote, "/data", &local, false);
    assert!(local.join("z.txt").is_file());
    assert!(!local.join("locked").join("secret.txt").exists());
    assert!(!local.join("open").join("b.txt").exists());
    assert!(matches!(
        stats.failures.as_slice(),
        [MirrorError::Navigation(..), MirrorError::Listing(..)]
    ));
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn missing_root_is_recorded_not_escalated() {
    let local = make_tmp_dir("noroot");
    let remote = MemoryRemote::new();
    remote.add_file("/elsewhere/a.txt", b"a");

    let stats = run(&remote, "/data", &local, false);
    assert!(matches!(stats.failures.as_slice(), [MirrorError::Navigation(..)]));
    assert_eq!(stats.dirs_visited, 0);
    assert_eq!(remote.ops().last(), Some(&Op::Close));
    let _ = std::fs::remove_dir_all(&local);
}
