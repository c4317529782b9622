//! Recursive mirror-and-reconcile engine.
//!
//! The remote tree is walked depth-first, one remote call at a time. Local
//! presence is the only signal that a file was already handled; contents are
//! never compared. Failures that concern one file or one subtree are logged,
//! recorded in [`MirrorStats::failures`] and skipped. Connection-level
//! failures abort the walk and are returned to the caller.

use std::path::Path;

use crate::error::MirrorError;
use crate::parse::join_remote;
use crate::transport::{EntryKind, Transport, display_path};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub dirs_visited: u64,
    pub local_dirs_created: u64,
    pub files_fetched: u64,
    pub bytes_fetched: u64,
    pub files_skipped: u64,
    pub remote_files_deleted: u64,
    pub remote_dirs_deleted: u64,
    pub failures: Vec<MirrorError>,
}

pub struct Mirror<'t> {
    transport: &'t mut dyn Transport,
    delete_remote: bool,
    stats: MirrorStats,
}

impl<'t> Mirror<'t> {
    pub fn new(transport: &'t mut dyn Transport, delete_remote: bool) -> Self {
        Self { transport, delete_remote, stats: MirrorStats::default() }
    }

    /// Mirror the configured root. The root is never a fresh descent, so it is
    /// never removed remotely even when empty.
    pub fn run(mut self, remote_root: &str, local_root: &Path) -> Result<MirrorStats, MirrorError> {
        tracing::info!(remote = remote_root, local = %display_path(local_root), "mirror run started");
        self.mirror(remote_root, local_root, false)?;
        Ok(self.stats)
    }

    /// Synchronise `remote_dir` into `local_dir`. `fresh_descent` is true for
    /// every directory reached by recursion, i.e. anything but the root.
    pub fn mirror(
        &mut self,
        remote_dir: &str,
        local_dir: &Path,
        fresh_descent: bool,
    ) -> Result<(), MirrorError> {
        if let Err(e) = self.transport.change_dir(remote_dir) {
            return self.record(e);
        }
        let entries = match self.transport.list() {
            Ok(v) => v,
            Err(e) => return self.record(e),
        };
        self.stats.dirs_visited += 1;

        if entries.is_empty() {
            if fresh_descent {
                match self.transport.delete_dir(remote_dir) {
                    Ok(()) => {
                        self.stats.remote_dirs_deleted += 1;
                        tracing::info!(remote = remote_dir, "removed empty remote directory");
                    }
                    Err(e) => self.record(e)?,
                }
            }
            return Ok(());
        }

        for entry in entries {
            if crate::transport::is_unsafe_entry_name(&entry.name) {
                tracing::warn!(remote = remote_dir, name = %entry.name, "skipping unsafe entry name");
                continue;
            }
            let local_path = local_dir.join(&entry.name);
            match entry.kind {
                EntryKind::Directory => {
                    match ensure_local_dir(&local_path) {
                        Ok(true) => {
                            self.stats.local_dirs_created += 1;
                            tracing::debug!(local = %display_path(&local_path), "created local directory");
                        }
                        Ok(false) => {}
                        Err(e) => {
                            self.record(e)?;
                            continue;
                        }
                    }
                    let remote_path = join_remote(remote_dir, &entry.name);
                    self.mirror(&remote_path, &local_path, true)?;
                }
                EntryKind::File => {
                    let delete_remote = self.delete_remote;
                    self.reconcile(remote_dir, &entry.name, &local_path, delete_remote)?;
                }
            }
        }
        Ok(())
    }

    /// Make sure `file_name` from `remote_dir` exists at `local_path`, then drain
    /// the remote copy when `delete_remote` is set. The remote copy is only
    /// removed once a local file is known to be there.
    pub fn reconcile(
        &mut self,
        remote_dir: &str,
        file_name: &str,
        local_path: &Path,
        delete_remote: bool,
    ) -> Result<(), MirrorError> {
        let remote_path = join_remote(remote_dir, file_name);

        if let Ok(meta) = local_path.metadata() {
            if !meta.is_file() {
                return self.record(MirrorError::LocalIo(
                    local_path.display().to_string(),
                    format!("exists but is not a regular file (remote {})", remote_path),
                ));
            }
            self.stats.files_skipped += 1;
            tracing::debug!(remote = %remote_path, "already present locally, not fetching");
            if delete_remote {
                self.remove_remote_file(remote_dir, file_name)?;
            }
            return Ok(());
        }

        if !self.position(remote_dir)? {
            return Ok(());
        }
        match self.transport.fetch(file_name, local_path) {
            Ok(bytes) => {
                self.stats.files_fetched += 1;
                self.stats.bytes_fetched += bytes;
                tracing::info!(
                    remote = %remote_path,
                    local = %display_path(local_path),
                    bytes,
                    "fetched"
                );
                if delete_remote {
                    self.remove_remote_file(remote_dir, file_name)?;
                }
                Ok(())
            }
            Err(e) => self.record(e),
        }
    }

    fn remove_remote_file(&mut self, remote_dir: &str, file_name: &str) -> Result<(), MirrorError> {
        if !self.position(remote_dir)? {
            return Ok(());
        }
        match self.transport.delete_file(file_name) {
            Ok(()) => {
                self.stats.remote_files_deleted += 1;
                tracing::info!(remote = %join_remote(remote_dir, file_name), "removed remote file");
                Ok(())
            }
            Err(e) => self.record(e),
        }
    }

    /// Recursion into a subdirectory moves the transport; come back before
    /// touching files of `remote_dir`. Returns false when that is impossible.
    fn position(&mut self, remote_dir: &str) -> Result<bool, MirrorError> {
        if self.transport.current_dir() == remote_dir {
            return Ok(true);
        }
        match self.transport.change_dir(remote_dir) {
            Ok(()) => Ok(true),
            Err(e) => {
                self.record(e)?;
                Ok(false)
            }
        }
    }

    /// Swallow a contained failure, or hand back one that ends the run.
    fn record(&mut self, e: MirrorError) -> Result<(), MirrorError> {
        if e.escalates() {
            return Err(e);
        }
        tracing::warn!(error = %e, "skipped");
        self.stats.failures.push(e);
        Ok(())
    }
}

/// Returns whether the directory had to be created.
fn ensure_local_dir(path: &Path) -> Result<bool, MirrorError> {
    match path.metadata() {
        Ok(meta) if meta.is_dir() => Ok(false),
        Ok(_) => Err(MirrorError::LocalIo(
            path.display().to_string(),
            "exists but is not a directory".to_string(),
        )),
        Err(_) => match std::fs::create_dir(path) {
            Ok(()) => Ok(true),
            Err(e) => Err(MirrorError::LocalIo(path.display().to_string(), e.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Connector;
    use crate::transport::memory::{MemoryRemote, Op};

    fn make_tmp_dir() -> std::path::PathBuf {
        let mut base = std::env::temp_dir();
        let uniq = format!(
            "mp_mirror_test_{}_{}",
            std::process::id(),
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        );
        base.push(uniq);
        std::fs::create_dir(&base).expect("create tmp dir");
        base
    }

    fn run(remote: &MemoryRemote, root: &str, local: &Path, delete: bool) -> MirrorStats {
        let mut conn = remote.clone();
        let mut t = conn.connect().expect("connect");
        let stats = Mirror::new(t.as_mut(), delete).run(root, local).expect("run");
        t.close();
        stats
    }

    #[test]
    fn present_file_is_not_fetched_but_is_drained() {
        let local = make_tmp_dir();
        std::fs::write(local.join("a.txt"), b"local copy").expect("seed");
        let remote = MemoryRemote::new();
        remote.add_file("/data/a.txt", b"remote copy");

        let stats = run(&remote, "/data", &local, true);
        assert_eq!(stats.files_fetched, 0);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.remote_files_deleted, 1);
        assert!(!remote.has_file("/data/a.txt"));
        // local content untouched
        assert_eq!(std::fs::read(local.join("a.txt")).expect("read"), b"local copy");
        let _ = std::fs::remove_dir_all(&local);
    }

    #[test]
    fn failed_fetch_keeps_remote_copy() {
        let local = make_tmp_dir();
        let remote = MemoryRemote::new();
        remote.add_file("/data/a.txt", b"x").fail_fetch("/data/a.txt");

        let stats = run(&remote, "/data", &local, true);
        assert_eq!(stats.files_fetched, 0);
        assert_eq!(stats.failures.len(), 1);
        assert!(matches!(stats.failures[0], MirrorError::Transfer(..)));
        assert!(remote.has_file("/data/a.txt"));
        assert!(!local.join("a.txt").exists());
        assert_eq!(remote.count(|op| matches!(op, Op::DeleteFile(_))), 0);
        let _ = std::fs::remove_dir_all(&local);
    }

    #[test]
    fn removal_failure_is_not_fatal() {
        let local = make_tmp_dir();
        let remote = MemoryRemote::new();
        remote
            .add_file("/data/a.txt", b"a")
            .add_file("/data/b.txt", b"b")
            .fail_remove("/data/a.txt");

        let stats = run(&remote, "/data", &local, true);
        assert_eq!(stats.files_fetched, 2);
        assert_eq!(stats.remote_files_deleted, 1);
        assert!(local.join("a.txt").exists());
        assert!(remote.has_file("/data/a.txt"));
        assert!(!remote.has_file("/data/b.txt"));
        assert!(matches!(stats.failures.as_slice(), [MirrorError::Removal(..)]));
        let _ = std::fs::remove_dir_all(&local);
    }

    #[test]
    fn returns_to_parent_after_descent() {
        let local = make_tmp_dir();
        let remote = MemoryRemote::new();
        // listing is name-ordered: "a" (dir) before "z.txt"
        remote.add_file("/data/a/inner.txt", b"1").add_file("/data/z.txt", b"2");

        let stats = run(&remote, "/data", &local, false);
        assert_eq!(stats.files_fetched, 2);
        assert_eq!(std::fs::read(local.join("z.txt")).expect("read"), b"2");
        assert_eq!(std::fs::read(local.join("a").join("inner.txt")).expect("read"), b"1");
        let ops = remote.ops();
        let back = ops.iter().rposition(|op| *op == Op::ChangeDir("/data".to_string()));
        let fetch_z = ops.iter().position(|op| *op == Op::Fetch("/data/z.txt".to_string()));
        assert!(back.is_some() && fetch_z.is_some() && back < fetch_z);
        let _ = std::fs::remove_dir_all(&local);
    }

    #[test]
    fn local_file_in_place_of_directory_skips_subtree() {
        let local = make_tmp_dir();
        std::fs::write(local.join("sub"), b"i am a file").expect("seed");
        let remote = MemoryRemote::new();
        remote.add_file("/data/sub/x.txt", b"x").add_file("/data/y.txt", b"y");

        let stats = run(&remote, "/data", &local, true);
        assert!(matches!(stats.failures.as_slice(), [MirrorError::LocalIo(..)]));
        assert!(remote.has_file("/data/sub/x.txt"));
        assert!(!remote.has_file("/data/y.txt"));
        assert!(local.join("y.txt").exists());
        assert_eq!(remote.count(|op| *op == Op::ChangeDir("/data/sub".to_string())), 0);
        let _ = std::fs::remove_dir_all(&local);
    }

    #[test]
    fn local_directory_in_place_of_file_blocks_deletion() {
        let local = make_tmp_dir();
        std::fs::create_dir(local.join("a.txt")).expect("seed");
        let remote = MemoryRemote::new();
        remote.add_file("/data/a.txt", b"a");

        let stats = run(&remote, "/data", &local, true);
        assert!(matches!(stats.failures.as_slice(), [MirrorError::LocalIo(..)]));
        assert!(remote.has_file("/data/a.txt"));
        assert!(remote.fetches().is_empty());
        let _ = std::fs::remove_dir_all(&local);
    }

    #[test]
    fn lost_connection_aborts_run() {
        let local = make_tmp_dir();
        let remote = MemoryRemote::new();
        remote
            .add_file("/data/a.txt", b"a")
            .add_file("/data/b.txt", b"b")
            .drop_connection_at("/data/a.txt");

        let mut conn = remote.clone();
        let mut t = conn.connect().expect("connect");
        let err = Mirror::new(t.as_mut(), true).run("/data", &local).expect_err("must abort");
        assert!(matches!(err, MirrorError::Connection(..)));
        assert!(remote.fetches() == vec!["/data/a.txt".to_string()]);
        assert!(remote.has_file("/data/a.txt") && remote.has_file("/data/b.txt"));
        let _ = std::fs::remove_dir_all(&local);
    }
}
