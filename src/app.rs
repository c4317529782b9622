use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use crate::config::Config;
use crate::error::MirrorError;
use crate::mirror::{Mirror, MirrorStats};
use crate::recovery::{ConsolePrompt, NoPrompt, Outcome, Prompt, run_with_recovery};
use crate::restart::{RemoteRestart, SshRestarter};
use crate::transport::{Connector, SftpConnector, normalize_path};

/// One full run: connect, mirror from the root, close. The transport is
/// closed on success and on failure alike before the result is returned.
pub fn run_once(
    connector: &mut dyn Connector,
    remote_root: &str,
    local_root: &Path,
    delete_remote: bool,
) -> Result<MirrorStats, MirrorError> {
    tracing::info!(server = %connector.describe(), "connecting");
    let mut transport = connector.connect()?;
    let result = Mirror::new(transport.as_mut(), delete_remote).run(remote_root, local_root);
    transport.close();
    result
}

/// Everything the recovery-wrapped run needs besides the configuration.
pub struct Collaborators<'a> {
    pub connector: &'a mut dyn Connector,
    pub restarter: &'a mut dyn RemoteRestart,
    pub prompt: &'a mut dyn Prompt,
}

/// Run the mirror under the recovery loop. Returns `true` when a run
/// completed, `false` when the operator chose to stop.
pub fn run_mirror(config: &Config, deps: Collaborators<'_>, failures_dir: Option<&Path>) -> bool {
    let Collaborators { connector, restarter, prompt } = deps;
    let remote_root = normalize_path(&config.ftp_config.remote_dir, false);
    let local_root = config.ftp_config.local_dir.as_path();
    let delete_remote = config.delete_remote_files;

    let start = Instant::now();
    let outcome = run_with_recovery(
        || run_once(&mut *connector, &remote_root, local_root, delete_remote),
        prompt,
        restarter,
        config.restart_grace(),
    );

    match outcome {
        Outcome::Completed(stats) => {
            crate::util::print_summary(&stats, start.elapsed().as_secs_f64());
            if let Some(dir) = failures_dir
                && let Some(p) = crate::util::write_failures_jsonl(dir, &stats.failures)
            {
                println!("Skipped items written to: {}", p.display());
            }
            true
        }
        Outcome::OperatorExit(failure) => {
            tracing::info!(error = %failure, "stopped by operator");
            false
        }
    }
}

/// `run` subcommand with the production collaborators.
pub fn handle_run(config: &Config, no_prompt: bool) -> Result<i32> {
    config.ensure_local_root()?;
    let mut connector = SftpConnector::from_config(config)?;
    let mut restarter = SshRestarter::new(config.ssh_config.clone(), config.connect_timeout());
    let logs = crate::config::logs_dir().ok();

    let completed = if no_prompt {
        let mut prompt = NoPrompt;
        run_mirror(
            config,
            Collaborators { connector: &mut connector, restarter: &mut restarter, prompt: &mut prompt },
            logs.as_deref(),
        )
    } else {
        // dropped at the end of this block on every path, releasing stdin
        let mut prompt = ConsolePrompt::stdio();
        run_mirror(
            config,
            Collaborators { connector: &mut connector, restarter: &mut restarter, prompt: &mut prompt },
            logs.as_deref(),
        )
    };
    // an interactive exit is the operator's call; unattended runs report it
    Ok(if completed || !no_prompt { 0 } else { 1 })
}

/// `restart` subcommand: run the restart command once.
pub fn handle_restart(config: &Config) -> Result<i32> {
    let mut restarter = SshRestarter::new(config.ssh_config.clone(), config.connect_timeout());
    let report = restarter.restart()?;
    if report.succeeded() {
        println!("✅ Restart command finished");
        Ok(0)
    } else {
        eprintln!("❌ Restart command exited with status {}", report.exit_status);
        Ok(1)
    }
}
