//! Flat directory queue
//!
//! All elements live directly in the queue root. Operations are cheaper
//! than with [`NormalQueue`](crate::queue::NormalQueue) but every listing
//! scans the whole queue, so it suits low to medium volumes.

use crate::name::{is_element_name, NameGenerator};
use crate::queue::error::QueueError;
use crate::queue::store::ElementDir;
use crate::queue::{ElementId, PurgeOptions, PurgeReport, Queue, QueueOptions};
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info};

/// Directory queue without buckets
#[derive(Debug)]
pub struct SimpleQueue {
    dir: ElementDir,
    owner: String,
}

impl SimpleQueue {
    /// Open (creating if needed) the queue rooted at `root`.
    ///
    /// `options.max_elements` does not apply to a flat queue.
    pub fn new(root: impl AsRef<Path>, options: &QueueOptions) -> Result<Self, QueueError> {
        let owner = options.resolve_owner()?;
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| QueueError::io(&root, e))?;

        Ok(Self {
            dir: ElementDir::new(root),
            owner,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Consumer token of this handle.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn name<'a>(&self, id: &'a ElementId) -> Result<&'a str, QueueError> {
        let name = id.as_str();
        if is_element_name(name) {
            Ok(name)
        } else {
            Err(QueueError::not_found(name))
        }
    }
}

impl Queue for SimpleQueue {
    fn add(&self, data: &[u8]) -> Result<ElementId, QueueError> {
        let name = NameGenerator::global().next();
        self.dir
            .publish(&name, data)
            .map_err(|e| QueueError::io(self.dir.path(), e))?;
        debug!("Added element {name}");
        Ok(ElementId::new(name))
    }

    fn add_path(&self, path: &Path) -> Result<ElementId, QueueError> {
        if !path.is_file() {
            return Err(QueueError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a regular file"),
            ));
        }
        let name = NameGenerator::global().next();
        self.dir
            .adopt(&name, path)
            .map_err(|e| QueueError::io(path, e))?;
        debug!("Adopted {} as element {name}", path.display());
        Ok(ElementId::new(name))
    }

    fn count(&self) -> Result<usize, QueueError> {
        self.dir.count()
    }

    fn first(&self) -> Result<Option<ElementId>, QueueError> {
        Ok(self.dir.next_after(None, &self.owner)?.map(ElementId::new))
    }

    fn next(&self, after: &ElementId) -> Result<Option<ElementId>, QueueError> {
        let after = self.name(after)?;
        Ok(self.dir.next_after(Some(after), &self.owner)?.map(ElementId::new))
    }

    fn lock(&self, id: &ElementId) -> Result<bool, QueueError> {
        let locked = self.dir.lock(self.name(id)?, &self.owner)?;
        debug!("Lock {id} by {}: {locked}", self.owner);
        Ok(locked)
    }

    fn unlock(&self, id: &ElementId) -> Result<(), QueueError> {
        self.dir.unlock(self.name(id)?, &self.owner, id.as_str())
    }

    fn touch(&self, id: &ElementId) -> Result<(), QueueError> {
        self.dir.touch(self.name(id)?, &self.owner, id.as_str())
    }

    fn get(&self, id: &ElementId) -> Result<Vec<u8>, QueueError> {
        self.dir.read(self.name(id)?, &self.owner, id.as_str())
    }

    fn remove(&self, id: &ElementId) -> Result<(), QueueError> {
        self.dir.delete(self.name(id)?, &self.owner, id.as_str())?;
        debug!("Removed element {id}");
        Ok(())
    }

    fn purge(&self, options: &PurgeOptions) -> Result<PurgeReport, QueueError> {
        let mut report = PurgeReport::default();
        self.dir.sweep(SystemTime::now(), options, &mut report);
        info!(
            "Purged {}: {} temporary removed, {} unlocked, {} failures",
            self.dir.path().display(),
            report.temporary_removed,
            report.unlocked,
            report.failures
        );
        Ok(report)
    }
}
