//! Scratch-space ownership for run files.
//!
//! A `TempSpace` claims a unique directory under the configured scratch root
//! for the lifetime of one sort, mints fresh file names on request, and
//! removes everything on drop, whether the sort succeeded, failed, was
//! cancelled, or panicked. Deletion is best-effort: a leaked temp file is
//! a warning, never a fatal error, because the primary sort outcome still
//! has to be reported.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;

/// A per-invocation temporary directory.
#[derive(Debug)]
pub struct TempSpace {
    root: PathBuf,
    dir: PathBuf,
    counter: AtomicU64,
    owns_root: bool,
}

impl TempSpace {
    /// Create the scratch root (if needed) and a unique child directory for
    /// this invocation. Concurrent sorts sharing a root never collide: the
    /// child name includes the process id and a nanosecond timestamp.
    pub fn create(root: &Path) -> io::Result<TempSpace> {
        let owns_root = !root.exists();
        fs::create_dir_all(root)?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = root.join(format!("sort-{}-{}", process::id(), nanos));
        fs::create_dir(&dir)?;
        Ok(TempSpace {
            root: root.to_path_buf(),
            dir,
            counter: AtomicU64::new(0),
            owns_root,
        })
    }

    /// Mint a fresh, unique file path under this space. The file itself is
    /// not created.
    pub fn fresh_path(&self, prefix: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}-{:06}.run", prefix, n))
    }

    /// Create (if needed) and return the subdirectory for one merge pass, so
    /// a pass's intermediates can be dropped as a unit.
    pub fn pass_dir(&self, pass: usize) -> io::Result<PathBuf> {
        let dir = self.dir.join(format!("pass-{:02}", pass));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// The unique directory owned by this space.
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for TempSpace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("failed to remove temp dir {}: {}", self.dir.display(), e);
            }
        }
        // Only reap the root if we created it; it stays behind when the user
        // pointed us at a pre-existing directory. remove_dir refuses
        // non-empty directories, so a concurrent sort's files are safe.
        if self.owns_root {
            let _ = fs::remove_dir(&self.root);
        }
    }
}

/// Best-effort file deletion shared by the merge passes.
pub fn remove_file_best_effort(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("failed to remove {}: {}", path.display(), e);
        }
    }
}
