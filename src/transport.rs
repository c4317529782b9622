// transport module: the file-server capability consumed by the mirror engine
mod download;
mod helpers;
#[doc(hidden)]
pub mod memory;
mod session;
mod sftp;

use std::io::Read;
use std::path::Path;

use crate::error::MirrorError;

pub use download::write_atomically;
pub use helpers::{display_path, normalize_path};
pub(crate) use helpers::is_unsafe_entry_name;
pub use session::{connect_command_session, connect_password_session};
pub use sftp::{SftpConnector, SftpTransport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One item of a live directory listing. Never cached between calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: EntryKind::File }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: EntryKind::Directory }
    }
}

/// Readable remote file plus its advertised size, if the server reported one.
pub struct RemoteReader<'a> {
    pub reader: Box<dyn Read + 'a>,
    pub size: Option<u64>,
}

/// An authenticated connection to the file server with a working directory.
///
/// Names passed to `open_read`, `fetch` and `delete_file` are resolved against
/// the working directory set by `change_dir`; `delete_dir` takes a full path.
pub trait Transport {
    fn current_dir(&self) -> &str;
    fn change_dir(&mut self, path: &str) -> Result<(), MirrorError>;
    fn list(&mut self) -> Result<Vec<RemoteEntry>, MirrorError>;
    fn open_read(&mut self, remote_name: &str) -> Result<RemoteReader<'_>, MirrorError>;
    fn delete_file(&mut self, remote_name: &str) -> Result<(), MirrorError>;
    fn delete_dir(&mut self, remote_path: &str) -> Result<(), MirrorError>;
    fn close(&mut self);

    /// Download `remote_name` to `local_path`. Nothing appears at `local_path`
    /// unless the whole stream was written and synced. Returns bytes written.
    fn fetch(&mut self, remote_name: &str, local_path: &Path) -> Result<u64, MirrorError> {
        let remote_full = crate::parse::join_remote(self.current_dir(), remote_name);
        let RemoteReader { reader, size } = self.open_read(remote_name)?;
        write_atomically(reader, size, local_path, &remote_full)
    }
}

/// Opens fresh transports; the recovery loop reconnects through this on every retry.
pub trait Connector {
    fn connect(&mut self) -> Result<Box<dyn Transport>, MirrorError>;
    fn describe(&self) -> String;
}
