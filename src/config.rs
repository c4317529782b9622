use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use cli_table::{Cell, CellStruct, Style, Table, print_stdout};
use serde::{Deserialize, Serialize};

const APP_DIR_NAME: &str = concat!(".", env!("CARGO_PKG_NAME"));

fn default_ssh_port() -> u16 {
    22
}

fn default_restart_grace_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Process-wide configuration, read once at startup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub ftp_config: TransportConfig,
    pub ssh_config: SshConfig,
    #[serde(default)]
    pub delete_remote_files: bool,
    #[serde(default = "default_restart_grace_secs")]
    pub restart_grace_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// File-server side: where to pull from and where to put it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// `host[:port]`
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub remote_dir: String,
    pub local_dir: PathBuf,
}

/// Remote-command side, used only to restart the file service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    pub restart_command: String,
}

/// How the restart session authenticates, decided once before connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshAuth {
    PrivateKey { path: PathBuf, passphrase: Option<String> },
    Agent { socket: Option<String> },
}

impl SshConfig {
    /// A readable private key wins; the agent setting is dropped in that case.
    pub fn resolve_auth(&self) -> SshAuth {
        if let Some(p) = &self.private_key_path {
            match std::fs::File::open(p) {
                Ok(_) => {
                    return SshAuth::PrivateKey {
                        path: p.clone(),
                        passphrase: self.passphrase.clone().filter(|s| !s.is_empty()),
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        key = %p.display(),
                        error = %e,
                        "private key not readable, falling back to agent authentication"
                    );
                }
            }
        }
        SshAuth::Agent { socket: self.agent.clone().filter(|s| !s.is_empty()) }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Read, expand and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let mut cfg: Config = serde_json::from_str(&raw)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        cfg.expand_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    fn expand_paths(&mut self) {
        self.ftp_config.local_dir = expand_tilde(&self.ftp_config.local_dir);
        if let Some(p) = self.ssh_config.private_key_path.take() {
            self.ssh_config.private_key_path = Some(expand_tilde(&p));
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("ftpConfig.host", self.ftp_config.host.as_str()),
            ("ftpConfig.user", self.ftp_config.user.as_str()),
            ("ftpConfig.remoteDir", self.ftp_config.remote_dir.as_str()),
            ("sshConfig.host", self.ssh_config.host.as_str()),
            ("sshConfig.username", self.ssh_config.username.as_str()),
            ("sshConfig.restartCommand", self.ssh_config.restart_command.as_str()),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("config field {} must not be empty", name));
            }
        }
        if !self.ftp_config.remote_dir.starts_with('/') {
            return Err(anyhow::anyhow!(
                "ftpConfig.remoteDir must be an absolute path: {}",
                self.ftp_config.remote_dir
            ));
        }
        if self.ftp_config.local_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("config field ftpConfig.localDir must not be empty"));
        }
        let local = &self.ftp_config.local_dir;
        if local.exists() && !local.is_dir() {
            return Err(anyhow::anyhow!("ftpConfig.localDir is not a directory: {}", local.display()));
        }
        crate::parse::parse_host_port(&self.ftp_config.host, 22)
            .with_context(|| "invalid ftpConfig.host")?;
        Ok(())
    }

    /// Make sure the local root exists; it is the only directory created with
    /// `create_dir_all`, everything below it mirrors the remote one level at a time.
    pub fn ensure_local_root(&self) -> Result<()> {
        let root = &self.ftp_config.local_dir;
        if root.exists() {
            if !root.is_dir() {
                return Err(anyhow::anyhow!("ftpConfig.localDir is not a directory: {}", root.display()));
            }
            return Ok(());
        }
        std::fs::create_dir_all(root)
            .with_context(|| format!("cannot create local root {}", root.display()))
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_secs(self.restart_grace_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn template() -> Self {
        Config {
            ftp_config: TransportConfig {
                host: "files.example.com:22".to_string(),
                user: "mirror".to_string(),
                password: String::new(),
                remote_dir: "/srv/outbox".to_string(),
                local_dir: PathBuf::from("~/inbox"),
            },
            ssh_config: SshConfig {
                host: "files.example.com".to_string(),
                port: 22,
                username: "admin".to_string(),
                agent: None,
                private_key_path: Some(PathBuf::from("~/.ssh/id_ed25519")),
                passphrase: None,
                restart_command: "sudo systemctl restart sftp-server".to_string(),
            },
            delete_remote_files: false,
            restart_grace_secs: default_restart_grace_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Write the template to `path` unless something is already there.
    /// Returns false when an existing file was left untouched.
    pub fn write_template<P: AsRef<Path>>(path: P) -> Result<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(&Config::template())?;
        std::fs::write(path, body).with_context(|| format!("cannot write {}", path.display()))?;
        Ok(true)
    }

    pub fn show_table(&self) -> Result<()> {
        let auth = match self.ssh_config.resolve_auth() {
            SshAuth::PrivateKey { path, .. } => format!("key {}", path.display()),
            SshAuth::Agent { socket: Some(s) } => format!("agent {}", s),
            SshAuth::Agent { socket: None } => "agent".to_string(),
        };
        let rows: Vec<(&str, String)> = vec![
            ("File server", self.ftp_config.host.clone()),
            ("User", self.ftp_config.user.clone()),
            ("Password", mask(&self.ftp_config.password)),
            ("Remote dir", self.ftp_config.remote_dir.clone()),
            ("Local dir", self.ftp_config.local_dir.display().to_string()),
            ("Delete remote", self.delete_remote_files.to_string()),
            ("Restart host", self.ssh_config.addr()),
            ("Restart user", self.ssh_config.username.clone()),
            ("Restart auth", auth),
            ("Restart command", self.ssh_config.restart_command.clone()),
            ("Restart grace", format!("{}s", self.restart_grace_secs)),
        ];
        let title = vec!["Setting".cell().bold(true), "Value".cell().bold(true)];
        let table: Vec<Vec<CellStruct>> =
            rows.into_iter().map(|(k, v)| vec![k.cell(), v.cell()]).collect();
        print_stdout(table.table().title(title))?;
        Ok(())
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() { "(empty)".to_string() } else { "********".to_string() }
}

/// `~/.mirrorpilot`
pub fn app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot find user's home dir"))?;
    Ok(home.join(APP_DIR_NAME))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join("config.json"))
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(app_dir()?.join("logs"))
}

/// Expand a leading `~` to the home directory; other paths pass through.
pub fn expand_tilde(p: &Path) -> PathBuf {
    let Ok(rest) = p.strip_prefix("~") else {
        return p.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => p.to_path_buf(),
    }
}
