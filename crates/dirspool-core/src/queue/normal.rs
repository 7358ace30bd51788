//! Bucketed directory queue
//!
//! # Directory Structure
//!
//! ```text
//! <root>/
//!   00000000/                  full bucket
//!     <name>                   visible element
//!     <name>.worker-1.lck      element locked by consumer "worker-1"
//!   00000001/                  current bucket
//!     <name>.tmp               element being written
//! ```
//!
//! New elements go into the highest-numbered bucket until it holds
//! `max_elements` elements, then a new bucket is started. Two producers
//! racing to start the same bucket both end up using it, which at worst
//! lets a bucket run slightly over capacity.

use crate::name::NameGenerator;
use crate::queue::error::QueueError;
use crate::queue::store::ElementDir;
use crate::queue::{ElementId, PurgeOptions, PurgeReport, Queue, QueueOptions};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Times `add` re-selects a bucket that vanished under a concurrent purge
const MAX_ADD_RETRIES: u32 = 3;

/// Directory queue with elements spread over numbered buckets
#[derive(Debug)]
pub struct NormalQueue {
    root: PathBuf,
    max_elements: usize,
    owner: String,
}

impl NormalQueue {
    /// Open (creating if needed) the queue rooted at `root`.
    pub fn new(root: impl AsRef<Path>, options: &QueueOptions) -> Result<Self, QueueError> {
        if options.max_elements == 0 {
            return Err(QueueError::InvalidConfig {
                message: "max_elements must be at least 1".to_string(),
            });
        }
        let owner = options.resolve_owner()?;
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| QueueError::io(&root, e))?;

        Ok(Self {
            root,
            max_elements: options.max_elements,
            owner,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Consumer token of this handle.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn bucket(&self, name: &str) -> ElementDir {
        ElementDir::new(self.root.join(name))
    }

    /// Sorted bucket names.
    fn buckets(&self) -> Result<Vec<String>, QueueError> {
        let read_dir = fs::read_dir(&self.root).map_err(|e| QueueError::io(&self.root, e))?;

        let mut buckets = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| QueueError::io(&self.root, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_bucket_name(&name) {
                continue;
            }
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => buckets.push(name),
                Ok(_) => {
                    return Err(QueueError::Corruption {
                        path: entry.path(),
                        reason: "bucket entry is not a directory".to_string(),
                    });
                }
                // Removed by a concurrent purge
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(QueueError::io(entry.path(), e)),
            }
        }
        buckets.sort_unstable();
        Ok(buckets)
    }

    /// Bucket that the next element goes into, created if needed.
    fn insertion_bucket(&self) -> Result<String, QueueError> {
        let buckets = self.buckets()?;
        let next = match buckets.last() {
            None => 0,
            Some(last) => {
                if self.bucket(last).count()? < self.max_elements {
                    return Ok(last.clone());
                }
                u32::from_str_radix(last, 16)
                    .ok()
                    .and_then(|n| n.checked_add(1))
                    .ok_or_else(|| QueueError::Corruption {
                        path: self.root.join(last),
                        reason: "bucket counter exhausted".to_string(),
                    })?
            }
        };

        let name = format!("{next:08x}");
        let path = self.root.join(&name);
        match fs::create_dir(&path) {
            Ok(()) => debug!("Started bucket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(QueueError::io(path, e)),
        }
        Ok(name)
    }

    /// Split an id into bucket and element name.
    fn split_id<'a>(&self, id: &'a ElementId) -> Result<(&'a str, &'a str), QueueError> {
        id.as_str()
            .split_once('/')
            .filter(|(bucket, name)| {
                is_bucket_name(bucket) && crate::name::is_element_name(name)
            })
            .ok_or_else(|| QueueError::not_found(id.as_str()))
    }

    fn insert_with<F>(&self, mut write: F) -> Result<ElementId, QueueError>
    where
        F: FnMut(&ElementDir, &str) -> io::Result<()>,
    {
        let name = NameGenerator::global().next();
        let mut attempt = 0;
        loop {
            let bucket = self.insertion_bucket()?;
            let dir = self.bucket(&bucket);
            match write(&dir, &name) {
                Ok(()) => {
                    debug!("Added element {bucket}/{name}");
                    return Ok(ElementId::new(format!("{bucket}/{name}")));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < MAX_ADD_RETRIES => {
                    debug!("Bucket {bucket} vanished during add, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(QueueError::io(dir.path(), e)),
            }
        }
    }
}

impl Queue for NormalQueue {
    fn add(&self, data: &[u8]) -> Result<ElementId, QueueError> {
        self.insert_with(|dir, name| dir.publish(name, data))
    }

    fn add_path(&self, path: &Path) -> Result<ElementId, QueueError> {
        if !path.is_file() {
            return Err(QueueError::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "not a regular file"),
            ));
        }
        self.insert_with(|dir, name| dir.adopt(name, path))
    }

    fn count(&self) -> Result<usize, QueueError> {
        let mut count = 0;
        for bucket in self.buckets()? {
            count += self.bucket(&bucket).count()?;
        }
        Ok(count)
    }

    fn first(&self) -> Result<Option<ElementId>, QueueError> {
        for bucket in self.buckets()? {
            if let Some(name) = self.bucket(&bucket).next_after(None, &self.owner)? {
                return Ok(Some(ElementId::new(format!("{bucket}/{name}"))));
            }
        }
        Ok(None)
    }

    fn next(&self, after: &ElementId) -> Result<Option<ElementId>, QueueError> {
        let (after_bucket, after_name) = self.split_id(after)?;
        for bucket in self.buckets()? {
            let cursor = match bucket.as_str().cmp(after_bucket) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => Some(after_name),
                std::cmp::Ordering::Greater => None,
            };
            if let Some(name) = self.bucket(&bucket).next_after(cursor, &self.owner)? {
                return Ok(Some(ElementId::new(format!("{bucket}/{name}"))));
            }
        }
        Ok(None)
    }

    fn lock(&self, id: &ElementId) -> Result<bool, QueueError> {
        let (bucket, name) = self.split_id(id)?;
        let locked = self.bucket(bucket).lock(name, &self.owner)?;
        debug!("Lock {id} by {}: {locked}", self.owner);
        Ok(locked)
    }

    fn unlock(&self, id: &ElementId) -> Result<(), QueueError> {
        let (bucket, name) = self.split_id(id)?;
        self.bucket(bucket).unlock(name, &self.owner, id.as_str())
    }

    fn touch(&self, id: &ElementId) -> Result<(), QueueError> {
        let (bucket, name) = self.split_id(id)?;
        self.bucket(bucket).touch(name, &self.owner, id.as_str())
    }

    fn get(&self, id: &ElementId) -> Result<Vec<u8>, QueueError> {
        let (bucket, name) = self.split_id(id)?;
        self.bucket(bucket).read(name, &self.owner, id.as_str())
    }

    fn remove(&self, id: &ElementId) -> Result<(), QueueError> {
        let (bucket, name) = self.split_id(id)?;
        self.bucket(bucket).delete(name, &self.owner, id.as_str())?;
        debug!("Removed element {id}");
        Ok(())
    }

    fn purge(&self, options: &PurgeOptions) -> Result<PurgeReport, QueueError> {
        let now = SystemTime::now();
        let mut report = PurgeReport::default();
        let buckets = self.buckets()?;
        let newest = buckets.last().cloned();

        for bucket in &buckets {
            let dir = self.bucket(bucket);
            dir.sweep(now, options, &mut report);

            // The newest bucket is where producers are writing.
            if newest.as_ref() == Some(bucket) {
                continue;
            }
            // remove_dir only succeeds on an empty directory.
            match fs::remove_dir(dir.path()) {
                Ok(()) => {
                    debug!("Removed empty bucket {}", dir.path().display());
                    report.buckets_removed += 1;
                }
                Err(e) => debug!("Kept bucket {}: {e}", dir.path().display()),
            }
        }

        info!(
            "Purged {}: {} temporary removed, {} unlocked, {} buckets removed, {} failures",
            self.root.display(),
            report.temporary_removed,
            report.unlocked,
            report.buckets_removed,
            report.failures
        );
        Ok(report)
    }
}

fn is_bucket_name(name: &str) -> bool {
    name.len() == 8 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn queue_with_capacity(root: &Path, max_elements: usize) -> NormalQueue {
        let options = QueueOptions {
            max_elements,
            ..QueueOptions::default()
        };
        NormalQueue::new(root, &options).unwrap()
    }

    #[test]
    fn test_add_creates_first_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue_with_capacity(temp_dir.path(), 10);

        let id = queue.add(b"hello").unwrap();

        assert!(id.as_str().starts_with("00000000/"));
        assert!(temp_dir.path().join("00000000").is_dir());
    }

    #[test]
    fn test_bucket_rollover() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue_with_capacity(temp_dir.path(), 3);

        let ids: Vec<ElementId> = (0..7u8).map(|i| queue.add(&[i]).unwrap()).collect();

        let buckets: Vec<&str> = ids.iter().map(|id| &id.as_str()[..8]).collect();
        assert_eq!(
            buckets,
            vec![
                "00000000", "00000000", "00000000", "00000001", "00000001", "00000001",
                "00000002"
            ]
        );
        assert_eq!(queue.buckets().unwrap().len(), 3);
    }

    #[test]
    fn test_malformed_ids_are_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue_with_capacity(temp_dir.path(), 10);

        for bad in ["", "00000000", "xyz/abc", "00000000/../../etc/passwd"] {
            let id = ElementId::from(bad);
            assert!(queue.lock(&id).unwrap_err().is_not_found(), "{bad}");
            assert!(queue.get(&id).unwrap_err().is_not_found(), "{bad}");
        }
    }

    #[test]
    fn test_bucket_named_file_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue_with_capacity(temp_dir.path(), 10);
        fs::write(temp_dir.path().join("0000000a"), b"not a bucket").unwrap();

        assert!(matches!(queue.count(), Err(QueueError::Corruption { .. })));
    }

    #[test]
    fn test_foreign_root_entries_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue_with_capacity(temp_dir.path(), 10);
        fs::write(temp_dir.path().join("README"), b"hi").unwrap();
        fs::create_dir(temp_dir.path().join("archive")).unwrap();
        queue.add(b"x").unwrap();

        assert_eq!(queue.count().unwrap(), 1);
    }

    #[test]
    fn test_add_recovers_from_vanished_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue_with_capacity(temp_dir.path(), 10);
        let id = queue.add(b"a").unwrap();
        assert!(queue.lock(&id).unwrap());
        queue.remove(&id).unwrap();
        fs::remove_dir(temp_dir.path().join("00000000")).unwrap();

        let id = queue.add(b"b").unwrap();
        assert!(id.as_str().starts_with("00000000/"));
        assert_eq!(queue.count().unwrap(), 1);
    }

    #[test]
    fn test_purge_keeps_newest_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue_with_capacity(temp_dir.path(), 1);
        let first = queue.add(b"a").unwrap();
        let second = queue.add(b"b").unwrap();
        for id in [&first, &second] {
            assert!(queue.lock(id).unwrap());
            queue.remove(id).unwrap();
        }

        let report = queue.purge(&PurgeOptions::default()).unwrap();

        assert_eq!(report.buckets_removed, 1);
        assert_eq!(queue.buckets().unwrap(), vec!["00000001".to_string()]);
    }

    #[test]
    fn test_add_path_moves_file() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue_with_capacity(temp_dir.path().join("q").as_path(), 10);
        let source = temp_dir.path().join("ready.json");
        fs::write(&source, b"{\"body\":\"hi\"}").unwrap();

        let id = queue.add_path(&source).unwrap();

        assert!(!source.exists());
        assert!(queue.lock(&id).unwrap());
        assert_eq!(queue.get(&id).unwrap(), b"{\"body\":\"hi\"}");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let options = QueueOptions {
            max_elements: 0,
            ..QueueOptions::default()
        };
        assert!(matches!(
            NormalQueue::new(temp_dir.path(), &options),
            Err(QueueError::InvalidConfig { .. })
        ));
    }
}
