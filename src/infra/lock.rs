//! Per-path advisory locking around backup + mutate.
//!
//! The lock file lives inside the version directory (`<dir>/.lock`) so it
//! never shows up next to user files and never parses as a backup name.
//! Guards release on drop, covering every early return.

use std::{
    fs::{self, OpenOptions},
    path::Path,
};

use fd_lock::RwLock;
use tracing::trace;

use crate::core::error::{EditError, StorageContext};

/// Lock file name inside a version directory
pub const LOCK_FILE: &str = ".lock";

/// Run `f` while holding an exclusive advisory lock keyed on `version_dir`.
/// With `enabled == false` this is a plain call.
pub fn with_path_lock<T, F>(
    version_dir: &Path,
    enabled: bool,
    f: F,
) -> Result<T, EditError>
where
    F: FnOnce() -> Result<T, EditError>,
{
    if !enabled
    {
        return f();
    }

    fs::create_dir_all(version_dir)
        .storage(|| format!("create version dir {}", version_dir.display()))?;

    let lock_path = version_dir.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .storage(|| format!("open lock {}", lock_path.display()))?;

    let mut lock = RwLock::new(file);
    let _guard = lock
        .write()
        .storage(|| format!("acquire lock {}", lock_path.display()))?;
    trace!(lock = %lock_path.display(), "lock acquired");

    f()
}
