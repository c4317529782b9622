use std::path::Path;
use std::time::Duration;

use super::session::{connect_password_session, is_connection_lost};
use super::{Connector, RemoteEntry, RemoteReader, Transport};
use crate::error::MirrorError;
use crate::parse::join_remote;

/// `Transport` over an `ssh2::Sftp` channel. SFTP has no server-side working
/// directory, so the adapter keeps a logical one and resolves names against it.
pub struct SftpTransport {
    addr: String,
    session: Option<ssh2::Session>,
    sftp: Option<ssh2::Sftp>,
    cwd: String,
}

impl SftpTransport {
    pub fn new(addr: String, session: ssh2::Session) -> Result<Self, MirrorError> {
        let sftp = session
            .sftp()
            .map_err(|e| MirrorError::Connection(addr.clone(), format!("SFTP subsystem: {}", e)))?;
        Ok(Self { addr, session: Some(session), sftp: Some(sftp), cwd: "/".to_string() })
    }

    fn sftp(&self) -> Result<&ssh2::Sftp, MirrorError> {
        self.sftp
            .as_ref()
            .ok_or_else(|| MirrorError::Connection(self.addr.clone(), "transport closed".to_string()))
    }

    /// Lost connections escalate; everything else becomes the caller's kind.
    fn classify(
        &self,
        e: ssh2::Error,
        path: &str,
        kind: fn(String, String) -> MirrorError,
    ) -> MirrorError {
        if is_connection_lost(&e) {
            MirrorError::Connection(self.addr.clone(), format!("{} ({})", e, path))
        } else {
            kind(path.to_string(), e.to_string())
        }
    }
}

impl Transport for SftpTransport {
    fn current_dir(&self) -> &str {
        &self.cwd
    }

    fn change_dir(&mut self, path: &str) -> Result<(), MirrorError> {
        let st = match self.sftp()?.stat(Path::new(path)) {
            Ok(st) => st,
            Err(e) => return Err(self.classify(e, path, MirrorError::Navigation)),
        };
        if !st.is_dir() {
            return Err(MirrorError::Navigation(path.to_string(), "not a directory".to_string()));
        }
        self.cwd = path.to_string();
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<RemoteEntry>, MirrorError> {
        let raw = match self.sftp()?.readdir(Path::new(&self.cwd)) {
            Ok(v) => v,
            Err(e) => return Err(self.classify(e, &self.cwd, MirrorError::Listing)),
        };
        let mut entries = Vec::with_capacity(raw.len());
        for (pathbuf, stat) in raw {
            let Some(name) = pathbuf.file_name().and_then(|n| n.to_str()) else {
                tracing::debug!("skipping non UTF-8 entry {}", pathbuf.display());
                continue;
            };
            if matches!(name, "." | "..") {
                continue;
            }
            if stat.is_dir() {
                entries.push(RemoteEntry::dir(name));
            } else if stat.is_file() {
                entries.push(RemoteEntry::file(name));
            } else {
                tracing::debug!(remote = %join_remote(&self.cwd, name), "skipping special entry");
            }
        }
        Ok(entries)
    }

    fn open_read(&mut self, remote_name: &str) -> Result<RemoteReader<'_>, MirrorError> {
        let full = join_remote(&self.cwd, remote_name);
        let mut file = match self.sftp()?.open(Path::new(&full)) {
            Ok(f) => f,
            Err(e) => return Err(self.classify(e, &full, MirrorError::Transfer)),
        };
        let size = file.stat().ok().and_then(|st| st.size);
        Ok(RemoteReader { reader: Box::new(file), size })
    }

    fn delete_file(&mut self, remote_name: &str) -> Result<(), MirrorError> {
        let full = join_remote(&self.cwd, remote_name);
        match self.sftp()?.unlink(Path::new(&full)) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.classify(e, &full, MirrorError::Removal)),
        }
    }

    fn delete_dir(&mut self, remote_path: &str) -> Result<(), MirrorError> {
        match self.sftp()?.rmdir(Path::new(remote_path)) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.classify(e, remote_path, MirrorError::Removal)),
        }
    }

    fn close(&mut self) {
        self.sftp = None;
        if let Some(sess) = self.session.take() {
            let _ = sess.disconnect(None, "mirror run finished", None);
            tracing::debug!("closed transport to {}", self.addr);
        }
    }
}

impl Drop for SftpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connects to the file server with password credentials.
pub struct SftpConnector {
    host: String,
    port: u16,
    user: String,
    password: String,
    timeout: Duration,
}

impl SftpConnector {
    pub fn from_config(cfg: &crate::config::Config) -> anyhow::Result<Self> {
        let (host, port) = crate::parse::parse_host_port(&cfg.ftp_config.host, 22)?;
        Ok(Self {
            host,
            port,
            user: cfg.ftp_config.user.clone(),
            password: cfg.ftp_config.password.clone(),
            timeout: cfg.connect_timeout(),
        })
    }
}

impl Connector for SftpConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>, MirrorError> {
        let sess =
            connect_password_session(&self.host, self.port, &self.user, &self.password, self.timeout)?;
        let transport = SftpTransport::new(self.describe(), sess)?;
        Ok(Box::new(transport))
    }

    fn describe(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}
