//! One-time remote checkpoint fetch
//!
//! Downloads a pretrained checkpoint to a local path on first use. A lock
//! file next to the destination keeps concurrent service startups from
//! racing to write the same file: one process downloads while the others
//! wait for the finished file to appear. The download lands in a `.part`
//! file and is renamed only after its size checks out, so a partial
//! download is never mistaken for a usable checkpoint.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::utils::error::{Error, Result};

/// How long a waiting process gives the downloader before failing
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);
const WAIT_POLL: Duration = Duration::from_millis(200);

/// Removes the lock file when the owning scope ends, on error paths too.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {:?}: {}", self.path, e);
        }
    }
}

fn lock_path(dest: &Path) -> PathBuf {
    let mut path = dest.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

fn is_complete(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Ensure a remote checkpoint exists at `dest`, downloading it at most once.
///
/// Returns immediately if the file is already present and non-empty.
pub fn ensure_checkpoint(url: &str, dest: &Path) -> Result<()> {
    if is_complete(dest) {
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let lock = lock_path(dest);
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&lock)
    {
        Ok(_) => {
            let _guard = LockGuard { path: lock };
            // Another process may have finished between our existence check
            // and taking the lock.
            if is_complete(dest) {
                return Ok(());
            }
            download(url, dest)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => wait_for_download(dest, &lock),
        Err(e) => Err(Error::Fetch(format!(
            "cannot create lock file {:?}: {}",
            lock, e
        ))),
    }
}

/// Block until the process holding the lock finishes its download.
fn wait_for_download(dest: &Path, lock: &Path) -> Result<()> {
    info!("Another process is fetching {:?}, waiting", dest);
    let start = Instant::now();

    while start.elapsed() < WAIT_TIMEOUT {
        if is_complete(dest) {
            return Ok(());
        }
        if !lock.exists() {
            // Downloader is gone; one more check before giving up
            return if is_complete(dest) {
                Ok(())
            } else {
                Err(Error::Fetch(format!(
                    "download of {:?} was abandoned by another process",
                    dest
                )))
            };
        }
        std::thread::sleep(WAIT_POLL);
    }

    Err(Error::Fetch(format!(
        "timed out waiting for {:?} to finish downloading",
        dest
    )))
}

fn download(url: &str, dest: &Path) -> Result<()> {
    info!("Fetching checkpoint from {}", url);

    let response = reqwest::blocking::get(url)
        .map_err(|e| Error::Fetch(format!("request to {} failed: {}", url, e)))?
        .error_for_status()
        .map_err(|e| Error::Fetch(format!("server rejected request: {}", e)))?;

    let expected_len = response.content_length();
    let bytes = response
        .bytes()
        .map_err(|e| Error::Fetch(format!("download interrupted: {}", e)))?;

    if bytes.is_empty() {
        return Err(Error::Fetch(format!("empty response from {}", url)));
    }
    if let Some(expected) = expected_len {
        if bytes.len() as u64 != expected {
            return Err(Error::Fetch(format!(
                "size mismatch: got {} bytes, expected {}",
                bytes.len(),
                expected
            )));
        }
    }

    let part = dest.with_extension("part");
    std::fs::write(&part, &bytes)?;
    std::fs::rename(&part, dest)?;

    info!("Checkpoint saved to {:?} ({} bytes)", dest, bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_file_short_circuits() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("model.mpk");
        std::fs::write(&dest, b"weights").unwrap();

        // URL is never contacted when the file is already present
        ensure_checkpoint("http://invalid.localhost/model.mpk", &dest).unwrap();
    }

    #[test]
    fn test_empty_file_is_not_complete() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("model.mpk");
        std::fs::write(&dest, b"").unwrap();

        assert!(!is_complete(&dest));
    }

    #[test]
    fn test_lock_guard_removes_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let lock = tmp.path().join("model.mpk.lock");
        std::fs::write(&lock, b"").unwrap();

        drop(LockGuard { path: lock.clone() });
        assert!(!lock.exists());
    }

    #[test]
    fn test_abandoned_download_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("model.mpk");
        let lock = lock_path(&dest);

        // No lock and no file: the downloader died without producing output
        assert!(matches!(
            wait_for_download(&dest, &lock),
            Err(Error::Fetch(_))
        ));
    }
}
