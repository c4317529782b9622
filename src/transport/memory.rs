//! In-memory file server. Backs the test suite and lets the engine be
//! exercised without a network; every call is recorded for inspection.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Connector, RemoteEntry, RemoteReader, Transport};
use crate::error::MirrorError;
use crate::parse::join_remote;

const ADDR: &str = "memory";

/// A recorded transport or connector call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Connect,
    ChangeDir(String),
    List(String),
    Fetch(String),
    DeleteFile(String),
    DeleteDir(String),
    Close,
}

#[derive(Default)]
struct RemoteState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    fail_change_dir: BTreeSet<String>,
    fail_list: BTreeSet<String>,
    fail_fetch: BTreeSet<String>,
    fail_remove: BTreeSet<String>,
    refuse_connects: usize,
    drop_connection_at: Option<String>,
    ops: Vec<Op>,
}

impl RemoteState {
    fn add_dir_all(&mut self, path: &str) {
        let mut cur = String::new();
        self.dirs.insert("/".to_string());
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            cur = format!("{}/{}", cur, seg);
            self.dirs.insert(cur.clone());
        }
    }

    fn children(&self, dir: &str) -> Vec<RemoteEntry> {
        let mut out: BTreeMap<String, RemoteEntry> = BTreeMap::new();
        for d in &self.dirs {
            if parent_of(d).as_deref() == Some(dir) {
                let name = d.rsplit('/').next().unwrap_or_default().to_string();
                out.insert(name.clone(), RemoteEntry::dir(name));
            }
        }
        for f in self.files.keys() {
            if parent_of(f).as_deref() == Some(dir) {
                let name = f.rsplit('/').next().unwrap_or_default().to_string();
                out.insert(name.clone(), RemoteEntry::file(name));
            }
        }
        out.into_values().collect()
    }
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(i) => Some(path[..i].to_string()),
        None => None,
    }
}

/// Shared handle to an in-memory remote tree. Clones see the same state.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.lock().dirs.insert("/".to_string());
        remote
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        // a poisoned lock only means a test already panicked
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_dir(&self, path: &str) -> &Self {
        self.lock().add_dir_all(path);
        self
    }

    pub fn add_file(&self, path: &str, data: &[u8]) -> &Self {
        let mut st = self.lock();
        if let Some(parent) = parent_of(path) {
            st.add_dir_all(&parent);
        }
        st.files.insert(path.to_string(), data.to_vec());
        drop(st);
        self
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.lock().files.contains_key(path)
    }

    pub fn fail_change_dir(&self, path: &str) -> &Self {
        self.lock().fail_change_dir.insert(path.to_string());
        self
    }

    pub fn fail_list(&self, path: &str) -> &Self {
        self.lock().fail_list.insert(path.to_string());
        self
    }

    pub fn fail_fetch(&self, path: &str) -> &Self {
        self.lock().fail_fetch.insert(path.to_string());
        self
    }

    pub fn fail_remove(&self, path: &str) -> &Self {
        self.lock().fail_remove.insert(path.to_string());
        self
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_connects(&self, n: usize) -> &Self {
        self.lock().refuse_connects = n;
        self
    }

    /// Lose the connection once, when `path` is fetched.
    pub fn drop_connection_at(&self, path: &str) -> &Self {
        self.lock().drop_connection_at = Some(path.to_string());
        self
    }

    pub fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    pub fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.lock().ops.iter().filter(|op| pred(op)).count()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Fetch(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Connector for MemoryRemote {
    fn connect(&mut self) -> Result<Box<dyn Transport>, MirrorError> {
        let mut st = self.lock();
        st.ops.push(Op::Connect);
        if st.refuse_connects > 0 {
            st.refuse_connects -= 1;
            return Err(MirrorError::Connection(ADDR.to_string(), "connection refused".to_string()));
        }
        drop(st);
        Ok(Box::new(MemoryTransport { remote: self.clone(), cwd: "/".to_string(), open: true }))
    }

    fn describe(&self) -> String {
        ADDR.to_string()
    }
}

pub struct MemoryTransport {
    remote: MemoryRemote,
    cwd: String,
    open: bool,
}

impl MemoryTransport {
    fn guard(&self) -> Result<MutexGuard<'_, RemoteState>, MirrorError> {
        if !self.open {
            return Err(MirrorError::Connection(ADDR.to_string(), "transport closed".to_string()));
        }
        Ok(self.remote.lock())
    }
}

impl Transport for MemoryTransport {
    fn current_dir(&self) -> &str {
        &self.cwd
    }

    fn change_dir(&mut self, path: &str) -> Result<(), MirrorError> {
        let mut st = self.guard()?;
        st.ops.push(Op::ChangeDir(path.to_string()));
        if st.fail_change_dir.contains(path) {
            return Err(MirrorError::Navigation(path.to_string(), "permission denied".to_string()));
        }
        if !st.dirs.contains(path) {
            return Err(MirrorError::Navigation(path.to_string(), "no such directory".to_string()));
        }
        drop(st);
        self.cwd = path.to_string();
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<RemoteEntry>, MirrorError> {
        let mut st = self.guard()?;
        st.ops.push(Op::List(self.cwd.clone()));
        if st.fail_list.contains(&self.cwd) {
            return Err(MirrorError::Listing(self.cwd.clone(), "listing failed".to_string()));
        }
        Ok(st.children(&self.cwd))
    }

    fn open_read(&mut self, remote_name: &str) -> Result<RemoteReader<'_>, MirrorError> {
        let full = join_remote(&self.cwd, remote_name);
        let mut st = self.guard()?;
        st.ops.push(Op::Fetch(full.clone()));
        if st.drop_connection_at.as_deref() == Some(full.as_str()) {
            st.drop_connection_at = None;
            drop(st);
            self.open = false;
            return Err(MirrorError::Connection(ADDR.to_string(), format!("connection reset ({})", full)));
        }
        if st.fail_fetch.contains(&full) {
            return Err(MirrorError::Transfer(full, "simulated transfer failure".to_string()));
        }
        let data = st
            .files
            .get(&full)
            .cloned()
            .ok_or_else(|| MirrorError::Transfer(full.clone(), "no such file".to_string()))?;
        let size = Some(data.len() as u64);
        Ok(RemoteReader { reader: Box::new(Cursor::new(data)), size })
    }

    fn delete_file(&mut self, remote_name: &str) -> Result<(), MirrorError> {
        let full = join_remote(&self.cwd, remote_name);
        let mut st = self.guard()?;
        st.ops.push(Op::DeleteFile(full.clone()));
        if st.fail_remove.contains(&full) {
            return Err(MirrorError::Removal(full, "permission denied".to_string()));
        }
        match st.files.remove(&full) {
            Some(_) => Ok(()),
            None => Err(MirrorError::Removal(full, "no such file".to_string())),
        }
    }

    fn delete_dir(&mut self, remote_path: &str) -> Result<(), MirrorError> {
        let mut st = self.guard()?;
        st.ops.push(Op::DeleteDir(remote_path.to_string()));
        if st.fail_remove.contains(remote_path) {
            return Err(MirrorError::Removal(remote_path.to_string(), "permission denied".to_string()));
        }
        if !st.children(remote_path).is_empty() {
            return Err(MirrorError::Removal(remote_path.to_string(), "directory not empty".to_string()));
        }
        if st.dirs.remove(remote_path) {
            Ok(())
        } else {
            Err(MirrorError::Removal(remote_path.to_string(), "no such directory".to_string()))
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.remote.lock().ops.push(Op::Close);
        }
    }
}
