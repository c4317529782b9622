use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::error::MirrorError;

const COPY_BUF_SIZE: usize = 256 * 1024;

fn file_progress(size: Option<u64>, label: &str) -> ProgressBar {
    let pb = match size {
        Some(len) => {
            let pb = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr());
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=> "));
            }
            pb
        }
        None => {
            let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} {bytes}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    };
    pb.set_message(label.to_string());
    pb
}

/// Stream `reader` into a temporary sibling of `local_target`, fsync it and
/// rename it into place. Any failure removes the temporary file, so
/// `local_target` only ever appears complete.
pub fn write_atomically<R: Read>(
    mut reader: R,
    size: Option<u64>,
    local_target: &Path,
    remote_full: &str,
) -> Result<u64, MirrorError> {
    let file_name = local_target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            MirrorError::LocalIo(local_target.display().to_string(), "no file name".to_string())
        })?;
    let parent = local_target.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = parent.join(format!(".{}.mp.part.{}", file_name, std::process::id()));

    let mut local_f = File::create(&tmp_path).map_err(|e| {
        MirrorError::LocalIo(tmp_path.display().to_string(), format!("create failed: {}", e))
    })?;

    let pb = file_progress(size, file_name);
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut written: u64 = 0;
    let fail = |pb: &ProgressBar, err: MirrorError| -> Result<u64, MirrorError> {
        pb.finish_and_clear();
        let _ = std::fs::remove_file(&tmp_path);
        Err(err)
    };
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = local_f.write_all(&buf[..n]) {
                    tracing::debug!("write error for {}: {:?}", tmp_path.display(), e);
                    return fail(
                        &pb,
                        MirrorError::LocalIo(
                            local_target.display().to_string(),
                            format!("write failed: {}", e),
                        ),
                    );
                }
                written += n as u64;
                pb.inc(n as u64);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("remote read error for {}: {:?}", remote_full, e);
                return fail(
                    &pb,
                    MirrorError::Transfer(remote_full.to_string(), format!("read failed: {}", e)),
                );
            }
        }
    }
    if let Some(expected) = size
        && expected != written
    {
        return fail(
            &pb,
            MirrorError::Transfer(
                remote_full.to_string(),
                format!("short read: expected {} bytes, got {}", expected, written),
            ),
        );
    }
    if let Err(e) = local_f.sync_all() {
        return fail(
            &pb,
            MirrorError::LocalIo(local_target.display().to_string(), format!("sync failed: {}", e)),
        );
    }
    drop(local_f);
    if let Err(e) = atomic_rename_with_retries(&tmp_path, local_target) {
        return fail(
            &pb,
            MirrorError::LocalIo(
                local_target.display().to_string(),
                format!("rename failed: {}", e),
            ),
        );
    }
    pb.finish_and_clear();
    Ok(written)
}

/// Rename `tmp_path` over `local_target`, retrying a couple of times when the
/// target is held or already present (Windows semantics).
pub(crate) fn atomic_rename_with_retries(
    tmp_path: &Path,
    local_target: &Path,
) -> Result<(), std::io::Error> {
    let mut attempts = 0;
    loop {
        match std::fs::rename(tmp_path, local_target) {
            Ok(()) => return Ok(()),
            Err(e) => {
                let kind = e.kind();
                if attempts < 2
                    && (kind == std::io::ErrorKind::AlreadyExists
                        || kind == std::io::ErrorKind::PermissionDenied)
                {
                    let _ = std::fs::remove_file(local_target);
                    std::thread::sleep(Duration::from_millis(50));
                    attempts += 1;
                    continue;
                }
                return Err(e);
            }
        }
    }
}
