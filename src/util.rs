use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use cli_table::{Cell, CellStruct, Style, Table, format::Justify, print_stdout};
use owo_colors::OwoColorize;

use crate::error::MirrorError;
use crate::mirror::MirrorStats;

/// Try to enable ANSI escape sequence support on Windows consoles.
/// Returns true if enabling succeeded (or platform likely already supports ANSI), false otherwise.
#[cfg(windows)]
pub fn try_enable_ansi_on_windows() -> bool {
    enable_ansi_support::enable_ansi_support().is_ok()
}

// On non-Windows platforms terminals understand ANSI already.
#[cfg(not(windows))]
pub fn try_enable_ansi_on_windows() -> bool {
    true
}

/// Convert a byte count into a human readable string using IEC units (KiB/MiB/GiB).
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GiB", b / GB)
    } else if b >= MB {
        format!("{:.2} MiB", b / MB)
    } else if b >= KB {
        format!("{:.2} KiB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Print the end-of-run summary table.
pub fn print_summary(stats: &MirrorStats, elapsed_secs: f64) {
    let headline = if stats.failures.is_empty() {
        format!("✅ Mirror run completed in {:.2}s", elapsed_secs)
    } else {
        format!(
            "⚠️  Mirror run completed in {:.2}s with {} skipped item(s)",
            elapsed_secs,
            stats.failures.len()
        )
    };
    if try_enable_ansi_on_windows() {
        if stats.failures.is_empty() {
            println!("{}", headline.green());
        } else {
            println!("{}", headline.yellow());
        }
    } else {
        println!("{}", headline);
    }

    let rows: Vec<(&str, String)> = vec![
        ("Directories visited", stats.dirs_visited.to_string()),
        ("Local directories created", stats.local_dirs_created.to_string()),
        ("Files fetched", stats.files_fetched.to_string()),
        ("Bytes fetched", human_bytes(stats.bytes_fetched)),
        ("Already present", stats.files_skipped.to_string()),
        ("Remote files removed", stats.remote_files_deleted.to_string()),
        ("Remote directories removed", stats.remote_dirs_deleted.to_string()),
        ("Skipped (errors)", stats.failures.len().to_string()),
    ];
    let title = vec!["Item".cell().bold(true), "Count".cell().bold(true)];
    let table: Vec<Vec<CellStruct>> = rows
        .into_iter()
        .map(|(k, v)| vec![k.cell(), v.cell().justify(Justify::Right)])
        .collect();
    if let Err(e) = print_stdout(table.table().title(title)) {
        tracing::debug!("cannot print summary table: {}", e);
    }
}

/// Append failures as JSON Lines to `<dir>/failures_<UTC timestamp>.jsonl`.
/// Returns the file written, or None when nothing could be written.
pub fn write_failures_jsonl(dir: &Path, failures: &[MirrorError]) -> Option<PathBuf> {
    if failures.is_empty() {
        return None;
    }
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!("cannot create {}: {}", dir.display(), e);
        return None;
    }
    let path = dir.join(format!("failures_{}.jsonl", Utc::now().format("%Y%m%dT%H%M%SZ")));
    let mut f = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("cannot open {}: {}", path.display(), e);
            return None;
        }
    };
    if let Err(e) = write_failure_lines(&mut f, failures) {
        tracing::warn!("cannot write failure report {}: {}", path.display(), e);
        return None;
    }
    Some(path)
}

fn write_failure_lines<W: Write>(w: &mut W, failures: &[MirrorError]) -> std::io::Result<()> {
    for err in failures {
        let line = serde_json::to_string(&err.to_json())?;
        writeln!(w, "{}", line)?;
    }
    w.flush()
}
