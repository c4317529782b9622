use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::config::{SshAuth, SshConfig};
use crate::error::MirrorError;

/// Fallback identities tried after the agent, in order.
const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// TCP stream with a connect timeout and fixed I/O timeouts.
fn create_tcp_connection(addr: &str, timeout: Duration) -> std::io::Result<TcpStream> {
    let mut addrs = addr.to_socket_addrs()?;
    let sock = addrs.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, format!("no address for {}", addr))
    })?;
    let tcp = TcpStream::connect_timeout(&sock, timeout)?;
    let _ = tcp.set_read_timeout(Some(Duration::from_secs(30)));
    let _ = tcp.set_write_timeout(Some(Duration::from_secs(30)));
    Ok(tcp)
}

fn handshake(addr: &str, timeout: Duration) -> Result<ssh2::Session, String> {
    let tcp = create_tcp_connection(addr, timeout).map_err(|e| e.to_string())?;
    let mut sess = ssh2::Session::new().map_err(|e| format!("cannot create session: {}", e))?;
    sess.set_tcp_stream(tcp);
    sess.handshake().map_err(|e| format!("handshake failed: {}", e))?;
    Ok(sess)
}

/// Password login used by the file-server transport.
pub fn connect_password_session(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    timeout: Duration,
) -> Result<ssh2::Session, MirrorError> {
    let addr = format!("{}:{}", host, port);
    let sess = handshake(&addr, timeout).map_err(|m| MirrorError::Connection(addr.clone(), m))?;
    sess.userauth_password(user, password)
        .map_err(|e| MirrorError::Connection(addr.clone(), format!("authentication failed: {}", e)))?;
    if !sess.authenticated() {
        return Err(MirrorError::Connection(addr, "authentication failed".to_string()));
    }
    Ok(sess)
}

/// Try the user's default key files, as an interactive ssh client would.
fn try_default_keys(sess: &mut ssh2::Session, username: &str) -> bool {
    if sess.authenticated() {
        return true;
    }
    if let Some(home_p) = dirs::home_dir() {
        for name in DEFAULT_KEY_NAMES {
            let p = home_p.join(".ssh").join(name);
            if p.exists() {
                let _ = sess.userauth_pubkey_file(username, None, &p, None);
                if sess.authenticated() {
                    return true;
                }
            }
        }
    }
    false
}

fn authenticate(
    sess: &mut ssh2::Session,
    username: &str,
    auth: &SshAuth,
) -> Result<(), String> {
    match auth {
        SshAuth::PrivateKey { path, passphrase } => {
            sess.userauth_pubkey_file(username, None, Path::new(path), passphrase.as_deref())
                .map_err(|e| format!("key authentication with {} failed: {}", path.display(), e))?;
        }
        SshAuth::Agent { socket } => {
            if let Some(s) = socket
                && std::env::var("SSH_AUTH_SOCK").ok().as_deref() != Some(s.as_str())
            {
                tracing::warn!(
                    agent = %s,
                    "configured agent socket differs from SSH_AUTH_SOCK; libssh2 uses SSH_AUTH_SOCK"
                );
            }
            if let Err(e) = sess.userauth_agent(username) {
                tracing::debug!("agent authentication failed: {}", e);
            }
            if !try_default_keys(sess, username) {
                return Err("agent and default key authentication failed".to_string());
            }
        }
    }
    if sess.authenticated() { Ok(()) } else { Err("authentication failed".to_string()) }
}

/// Session for the remote-command channel.
pub fn connect_command_session(
    ssh: &SshConfig,
    auth: &SshAuth,
    timeout: Duration,
) -> Result<ssh2::Session, MirrorError> {
    let addr = ssh.addr();
    let mut sess = handshake(&addr, timeout).map_err(|m| MirrorError::Session(addr.clone(), m))?;
    authenticate(&mut sess, &ssh.username, auth).map_err(|m| MirrorError::Session(addr, m))?;
    Ok(sess)
}

/// libssh2 session-level codes that mean the connection itself is gone.
/// -7 SOCKET_SEND, -9 TIMEOUT, -13 SOCKET_DISCONNECT, -26 CHANNEL_CLOSED,
/// -30 SOCKET_TIMEOUT, -43 SOCKET_RECV
pub(crate) fn is_connection_lost(e: &ssh2::Error) -> bool {
    matches!(e.code(), ssh2::ErrorCode::Session(-7 | -9 | -13 | -26 | -30 | -43))
}
