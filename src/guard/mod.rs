//! Cross-process liveness guard for consensus nodes
//!
//! A running node holds an exclusive advisory lock on a file named after its
//! multi-sig address and node index. The OS drops the lock when the process
//! exits, however it exits, so the lock is the single source of truth for
//! "is this node running".

// fs2 calls are fully qualified; std::fs::File has inherent methods with the same names
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ChainError, Result};

const LOCK_EXTENSION: &str = "lock";

// A probe holds its shared lock for microseconds; a starting node rides that out.
const ACQUIRE_ATTEMPTS: u32 = 5;
const ACQUIRE_RETRY_DELAY: Duration = Duration::from_millis(20);

fn is_contended(error: &io::Error) -> bool {
    error.kind() == fs2::lock_contended_error().kind()
}

#[derive(Debug, Clone)]
pub struct NodeRuntimeGuard {
    lock_dir: PathBuf,
}

impl NodeRuntimeGuard {
    pub fn new(lock_dir: impl AsRef<Path>) -> Self {
        NodeRuntimeGuard {
            lock_dir: lock_dir.as_ref().to_path_buf(),
        }
    }

    fn lock_path(&self, identity: &str) -> PathBuf {
        let safe = !identity.is_empty()
            && identity
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        let file_name = if safe {
            identity.to_string()
        } else {
            hex::encode(identity.as_bytes())
        };
        self.lock_dir.join(format!("{}.{}", file_name, LOCK_EXTENSION))
    }

    /// Take the exclusive runtime lock for `identity`, held until the returned handle drops.
    ///
    /// Retries briefly while the lock is contended, sleeping the current thread.
    pub fn acquire(&self, identity: &str) -> Result<RuntimeLock> {
        fs::create_dir_all(&self.lock_dir)?;
        let path = self.lock_path(identity);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut attempt = 1;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(e) if is_contended(&e) && attempt < ACQUIRE_ATTEMPTS => {
                    attempt += 1;
                    thread::sleep(ACQUIRE_RETRY_DELAY);
                }
                Err(e) if is_contended(&e) => {
                    return Err(ChainError::AlreadyRunning(identity.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }

        // informational only; the lock itself is what matters
        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        info!(identity, path = %path.display(), "Runtime guard acquired");
        Ok(RuntimeLock {
            file,
            identity: identity.to_string(),
        })
    }

    /// [`acquire`](Self::acquire) on the blocking pool, for callers on an async runtime.
    pub async fn acquire_async(&self, identity: &str) -> Result<RuntimeLock> {
        let guard = self.clone();
        let identity = identity.to_string();
        tokio::task::spawn_blocking(move || guard.acquire(&identity))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    /// Whether some process currently holds the runtime lock for `identity`.
    ///
    /// Never blocks and never creates the lock file.
    pub fn probe(&self, identity: &str) -> Result<bool> {
        let path = self.lock_path(identity);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let running = match FileExt::try_lock_shared(&file) {
            Ok(()) => {
                FileExt::unlock(&file)?;
                false
            }
            Err(e) if is_contended(&e) => true,
            Err(e) => return Err(e.into()),
        };
        debug!(identity, running, "Runtime guard probed");
        Ok(running)
    }
}

/// Held runtime lock; released on drop or process exit.
#[derive(Debug)]
pub struct RuntimeLock {
    file: File,
    identity: String,
}

impl RuntimeLock {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RuntimeLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(identity = %self.identity, error = %e, "Explicit unlock failed, closing handle");
        }
        info!(identity = %self.identity, "Runtime guard released");
    }
}
