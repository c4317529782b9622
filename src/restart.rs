use std::io::{ErrorKind, Read};
use std::time::Duration;

use owo_colors::OwoColorize;

use crate::config::SshConfig;
use crate::error::MirrorError;
use crate::transport::connect_command_session;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What the remote restart command produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestartReport {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RestartReport {
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }
}

/// Restarts the remote file service. Returns once the command has finished.
pub trait RemoteRestart {
    fn restart(&mut self) -> Result<RestartReport, MirrorError>;
}

/// Runs the configured restart command over an SSH exec channel.
pub struct SshRestarter {
    ssh: SshConfig,
    timeout: Duration,
}

impl SshRestarter {
    pub fn new(ssh: SshConfig, timeout: Duration) -> Self {
        Self { ssh, timeout }
    }
}

/// Splits one output stream into lines, echoing each as it completes.
struct LineSink {
    is_stderr: bool,
    pending: Vec<u8>,
    collected: String,
}

impl LineSink {
    fn new(is_stderr: bool) -> Self {
        Self { is_stderr, pending: Vec::new(), collected: String::new() }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(i) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=i).collect();
            self.emit(&line);
        }
    }

    fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest);
        }
        self.collected
    }

    fn emit(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let shown = text.trim_end_matches(['\r', '\n']);
        if self.is_stderr {
            eprintln!("   {} {}", "│".red(), shown);
        } else {
            println!("   {} {}", "│".dimmed(), shown);
        }
        self.collected.push_str(&text);
    }
}

/// Read once from `reader` into `sink`. Returns whether any bytes arrived.
fn pump<R: Read>(mut reader: R, buf: &mut [u8], sink: &mut LineSink) -> std::io::Result<bool> {
    match reader.read(buf) {
        Ok(0) => Ok(false),
        Ok(n) => {
            sink.push(&buf[..n]);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

/// Drain stdout and stderr of a non-blocking channel together, so neither
/// stream can fill its window while the other is being read.
fn drain_channel(channel: &mut ssh2::Channel) -> std::io::Result<(String, String)> {
    let mut out = LineSink::new(false);
    let mut err = LineSink::new(true);
    let mut buf = vec![0u8; 8192];
    loop {
        let got_out = pump(&mut *channel, &mut buf, &mut out)?;
        let got_err = pump(channel.stderr(), &mut buf, &mut err)?;
        if got_out || got_err {
            continue;
        }
        if channel.eof() {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    Ok((out.finish(), err.finish()))
}

impl RemoteRestart for SshRestarter {
    fn restart(&mut self) -> Result<RestartReport, MirrorError> {
        let addr = self.ssh.addr();
        let auth = self.ssh.resolve_auth();
        tracing::info!(host = %addr, command = %self.ssh.restart_command, "restarting remote service");

        let sess = connect_command_session(&self.ssh, &auth, self.timeout)?;
        let session_err = |e: ssh2::Error| MirrorError::Session(addr.clone(), e.to_string());
        let mut channel = sess.channel_session().map_err(session_err)?;
        channel.exec(&self.ssh.restart_command).map_err(session_err)?;

        sess.set_blocking(false);
        let drained = drain_channel(&mut channel);
        sess.set_blocking(true);
        let (stdout, stderr) =
            drained.map_err(|e| MirrorError::Session(addr.clone(), format!("reading command output: {}", e)))?;
        channel.wait_close().map_err(session_err)?;
        let exit_status = channel.exit_status().map_err(session_err)?;
        let _ = sess.disconnect(None, "restart finished", None);

        if exit_status == 0 {
            tracing::info!(host = %addr, "restart command finished");
        } else {
            tracing::warn!(host = %addr, exit_status, "restart command exited with non-zero status");
        }
        Ok(RestartReport { exit_status, stdout, stderr })
    }
}
