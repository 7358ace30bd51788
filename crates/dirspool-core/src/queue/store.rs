//! One directory of element files
//!
//! Both the bucketed and the flat queue keep their elements in directories
//! of this shape. All transitions are single renames or unlinks:
//!
//! ```text
//! <name>.tmp  --rename-->  <name>  --rename-->  <name>.<owner>.lck  --unlink--> gone
//!                            ^                        |
//!                            +--------rename----------+  (unlock / purge)
//! ```

use crate::io::atomic::{rename_noreplace, sync_dir, touch, write_synced};
use crate::name::{locked_name, parse_entry, temporary_name, EntryName};
use crate::queue::error::QueueError;
use crate::queue::{PurgeOptions, PurgeReport};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub(crate) struct ElementDir {
    path: PathBuf,
}

impl ElementDir {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Sorted entry names; a missing directory has none.
    fn entries(&self) -> Result<Vec<String>, QueueError> {
        let read_dir = match fs::read_dir(&self.path) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(QueueError::io(&self.path, e)),
        };

        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| QueueError::io(&self.path, e))?;
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    /// Visible plus locked elements.
    pub(crate) fn count(&self) -> Result<usize, QueueError> {
        Ok(self
            .entries()?
            .iter()
            .filter(|entry| {
                matches!(
                    parse_entry(entry),
                    Some(EntryName::Visible(_) | EntryName::Locked { .. })
                )
            })
            .count())
    }

    /// Write `data` under a temporary name, then publish it as `name`.
    ///
    /// Returns the raw I/O error so callers can tell a vanished directory
    /// (`NotFound`) from other failures.
    pub(crate) fn publish(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let tmp = self.path.join(temporary_name(name));
        if let Err(e) = write_synced(&tmp, data) {
            if e.kind() != io::ErrorKind::AlreadyExists {
                let _ = fs::remove_file(&tmp);
            }
            return Err(e);
        }

        if let Err(e) = rename_noreplace(&tmp, &self.path.join(name)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        if let Err(e) = sync_dir(&self.path) {
            warn!("Failed to sync directory {}: {e}", self.path.display());
        }
        Ok(())
    }

    /// Move a complete file into this directory as element `name`.
    pub(crate) fn adopt(&self, name: &str, source: &Path) -> io::Result<()> {
        rename_noreplace(source, &self.path.join(name))?;
        if let Err(e) = sync_dir(&self.path) {
            warn!("Failed to sync directory {}: {e}", self.path.display());
        }
        Ok(())
    }

    fn locked_path(&self, name: &str, owner: &str) -> PathBuf {
        self.path.join(locked_name(name, owner))
    }

    /// Claim `name` for `owner`.
    ///
    /// `Ok(false)` when the element is not visible any more (locked by
    /// another consumer or removed). `Ok(true)` when `owner` already holds it.
    pub(crate) fn lock(&self, name: &str, owner: &str) -> Result<bool, QueueError> {
        let visible = self.path.join(name);
        let locked = self.locked_path(name, owner);
        let lost = || Ok(fs::symlink_metadata(&locked).is_ok());

        // Purge ages locks by mtime, so the locked file must never carry the
        // creation time. Refreshing after the rename would leave a window
        // where a fresh lock looks stale.
        match touch(&visible) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return lost(),
            Err(e) => return Err(QueueError::io(visible, e)),
        }

        match rename_noreplace(&visible, &locked) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => lost(),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(QueueError::io(visible, e)),
        }
    }

    pub(crate) fn unlock(&self, name: &str, owner: &str, id: &str) -> Result<(), QueueError> {
        let locked = self.locked_path(name, owner);
        rename_noreplace(&locked, &self.path.join(name)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => QueueError::not_found(id),
            _ => QueueError::io(locked.clone(), e),
        })
    }

    pub(crate) fn touch(&self, name: &str, owner: &str, id: &str) -> Result<(), QueueError> {
        let locked = self.locked_path(name, owner);
        touch(&locked).map_err(|e| self.locked_error(locked, id, e))
    }

    pub(crate) fn read(&self, name: &str, owner: &str, id: &str) -> Result<Vec<u8>, QueueError> {
        let locked = self.locked_path(name, owner);
        fs::read(&locked).map_err(|e| self.locked_error(locked, id, e))
    }

    pub(crate) fn delete(&self, name: &str, owner: &str, id: &str) -> Result<(), QueueError> {
        let locked = self.locked_path(name, owner);
        fs::remove_file(&locked).map_err(|e| self.locked_error(locked, id, e))
    }

    fn locked_error(&self, locked: PathBuf, id: &str, e: io::Error) -> QueueError {
        if e.kind() == io::ErrorKind::NotFound {
            return QueueError::not_found(id);
        }
        match fs::symlink_metadata(&locked) {
            Ok(meta) if !meta.is_file() => QueueError::Corruption {
                path: locked,
                reason: "locked element is not a regular file".to_string(),
            },
            _ => QueueError::io(locked, e),
        }
    }

    /// First element after `after` that is visible or locked by `owner`.
    ///
    /// The entry is re-checked on disk right before it is returned.
    pub(crate) fn next_after(
        &self,
        after: Option<&str>,
        owner: &str,
    ) -> Result<Option<String>, QueueError> {
        for entry in self.entries()? {
            let name = match parse_entry(&entry) {
                Some(EntryName::Visible(name)) => name,
                Some(EntryName::Locked { name, owner: holder }) if holder == owner => name,
                _ => continue,
            };
            if after.is_some_and(|after| name <= after) {
                continue;
            }
            if fs::symlink_metadata(self.path.join(&entry)).is_ok() {
                return Ok(Some(name.to_string()));
            }
        }
        Ok(None)
    }

    /// Reclaim stale temporary files and stale locks in this directory.
    pub(crate) fn sweep(&self, now: SystemTime, options: &PurgeOptions, report: &mut PurgeReport) {
        let entries = match self.entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Purge could not list {}: {e}", self.path.display());
                report.failures += 1;
                return;
            }
        };

        for entry in entries {
            let path = self.path.join(&entry);
            match parse_entry(&entry) {
                Some(EntryName::Temporary(_)) => {
                    if !is_older_than(&path, now, options.max_temp_age) {
                        continue;
                    }
                    match fs::remove_file(&path) {
                        Ok(()) => {
                            debug!("Removed stale temporary file {}", path.display());
                            report.temporary_removed += 1;
                        }
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => {
                            warn!("Failed to remove temporary file {}: {e}", path.display());
                            report.failures += 1;
                        }
                    }
                }
                Some(EntryName::Locked { name, owner }) => {
                    if !is_older_than(&path, now, options.max_lock_age) {
                        continue;
                    }
                    match rename_noreplace(&path, &self.path.join(name)) {
                        Ok(()) => {
                            debug!("Released stale lock on {name} held by {owner}");
                            report.unlocked += 1;
                        }
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => {
                            warn!("Failed to release stale lock {}: {e}", path.display());
                            report.failures += 1;
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Age is measured from the mtime; mtimes in the future count as age zero.
fn is_older_than(path: &Path, now: SystemTime, max_age: Duration) -> bool {
    let Ok(modified) = fs::symlink_metadata(path).and_then(|meta| meta.modified()) else {
        return false;
    };
    now.duration_since(modified).unwrap_or(Duration::ZERO) >= max_age
}
