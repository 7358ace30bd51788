//! Black-hole queue
//!
//! Accepts every element and keeps none, so call sites can switch
//! persistence off without branching.

use crate::queue::error::QueueError;
use crate::queue::{ElementId, PurgeOptions, PurgeReport, Queue};
use std::fs;
use std::path::Path;

/// Queue that discards everything added to it
#[derive(Debug, Clone, Copy, Default)]
pub struct NullQueue;

impl NullQueue {
    pub fn new() -> Self {
        NullQueue
    }
}

impl Queue for NullQueue {
    fn add(&self, _data: &[u8]) -> Result<ElementId, QueueError> {
        Ok(ElementId::default())
    }

    /// Consumes the file like the other variants do, then drops it.
    fn add_path(&self, path: &Path) -> Result<ElementId, QueueError> {
        fs::remove_file(path).map_err(|e| QueueError::io(path, e))?;
        Ok(ElementId::default())
    }

    fn count(&self) -> Result<usize, QueueError> {
        Ok(0)
    }

    fn first(&self) -> Result<Option<ElementId>, QueueError> {
        Ok(None)
    }

    fn next(&self, _after: &ElementId) -> Result<Option<ElementId>, QueueError> {
        Ok(None)
    }

    fn lock(&self, id: &ElementId) -> Result<bool, QueueError> {
        Err(QueueError::not_found(id.as_str()))
    }

    fn unlock(&self, id: &ElementId) -> Result<(), QueueError> {
        Err(QueueError::not_found(id.as_str()))
    }

    fn touch(&self, id: &ElementId) -> Result<(), QueueError> {
        Err(QueueError::not_found(id.as_str()))
    }

    fn get(&self, id: &ElementId) -> Result<Vec<u8>, QueueError> {
        Err(QueueError::not_found(id.as_str()))
    }

    fn remove(&self, id: &ElementId) -> Result<(), QueueError> {
        Err(QueueError::not_found(id.as_str()))
    }

    fn purge(&self, _options: &PurgeOptions) -> Result<PurgeReport, QueueError> {
        Ok(PurgeReport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_disappears() {
        let queue = NullQueue::new();
        let id = queue.add(b"gone").unwrap();

        assert!(id.is_empty());
        assert_eq!(queue.count().unwrap(), 0);
        assert_eq!(queue.first().unwrap(), None);
        assert_eq!(queue.next(&id).unwrap(), None);
    }

    #[test]
    fn test_add_path_discards_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("payload");
        fs::write(&path, b"gone").unwrap();

        let queue = NullQueue::new();
        assert!(queue.add_path(&path).unwrap().is_empty());
        assert!(!path.exists());
        assert!(matches!(
            queue.add_path(&path),
            Err(QueueError::Io { .. })
        ));
    }

    #[test]
    fn test_element_operations_not_found() {
        let queue = NullQueue::new();
        let id = ElementId::from("00000000/anything");

        assert!(queue.lock(&id).unwrap_err().is_not_found());
        assert!(queue.unlock(&id).unwrap_err().is_not_found());
        assert!(queue.touch(&id).unwrap_err().is_not_found());
        assert!(queue.get(&id).unwrap_err().is_not_found());
        assert!(queue.remove(&id).unwrap_err().is_not_found());
        assert!(queue.dequeue(&id).unwrap_err().is_not_found());
        assert_eq!(queue.purge(&PurgeOptions::default()).unwrap(), PurgeReport::default());
    }
}
