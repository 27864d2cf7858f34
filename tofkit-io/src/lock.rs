//! Per-path locks for files shared between callers in one process.
//!
//! Threads of the current process are serialised per path. Other processes are not
//! excluded: no OS-level file lock is taken.

use crate::Result;
use log::debug;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};

struct Registry {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        held: Mutex::new(HashSet::new()),
        released: Condvar::new(),
    })
}

fn held() -> MutexGuard<'static, HashSet<PathBuf>> {
    registry()
        .held
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Resolves `path` to the key the lock is held under.
///
/// Existing files are canonicalised; for a file that does not exist yet, the parent
/// directory is canonicalised and the file name appended.
fn lock_key(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize()?,
        _ => std::env::current_dir()?,
    };
    Ok(match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    })
}

/// Exclusive access to a file path within this process.
///
/// Acquiring blocks until no other `FileLock` for the same path is alive. The lock is
/// released when the value is dropped, including while unwinding from an error.
///
/// This does not protect against another process using the same file.
#[derive(Debug)]
pub struct FileLock {
    key: PathBuf,
}

impl FileLock {
    /// Acquires the lock for `path`, waiting for any current holder.
    ///
    /// # Errors
    /// Returns an error if the path's directory cannot be resolved.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let key = lock_key(path.as_ref())?;
        let mut guard = held();
        while guard.contains(&key) {
            guard = registry()
                .released
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        guard.insert(key.clone());
        debug!("locked {}", key.display());
        Ok(Self { key })
    }

    /// Acquires the lock only if nobody holds it.
    ///
    /// # Errors
    /// Returns an error if the path's directory cannot be resolved.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let key = lock_key(path.as_ref())?;
        let mut guard = held();
        if guard.contains(&key) {
            return Ok(None);
        }
        guard.insert(key.clone());
        Ok(Some(Self { key }))
    }

    /// The resolved path the lock is held for.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.key
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        held().remove(&self.key);
        registry().released.notify_all();
    }
}

/// Runs `f` while holding the lock for `path`.
///
/// # Errors
/// Returns an error if the lock cannot be acquired, or whatever `f` returns.
pub fn with_file_lock<P, T, F>(path: P, f: F) -> Result<T>
where
    P: AsRef<Path>,
    F: FnOnce(&Path) -> Result<T>,
{
    let lock = FileLock::acquire(path.as_ref())?;
    f(lock.path())
}
