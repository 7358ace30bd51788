//! Directory-based queues
//!
//! A queue turns a directory tree into a multi-process FIFO using nothing
//! but atomic filesystem operations. There is no daemon and no lock
//! manager: any number of producer and consumer processes can open the
//! same root concurrently, and any of them can crash at any point.
//!
//! Three interchangeable variants implement [`Queue`]:
//!
//! - [`NormalQueue`]: elements spread over numbered bucket directories
//! - [`SimpleQueue`]: elements in one flat directory
//! - [`NullQueue`]: a black hole, for disabling persistence
//!
//! # Consumer Protocol
//!
//! ```rust,no_run
//! use dirspool_core::queue::{NormalQueue, Queue, QueueOptions};
//!
//! # fn main() -> Result<(), dirspool_core::queue::QueueError> {
//! let queue = NormalQueue::new("/var/spool/jobs", &QueueOptions::default())?;
//! queue.add(b"hello world")?;
//!
//! let mut cursor = queue.first()?;
//! while let Some(id) = cursor {
//!     if queue.lock(&id)? {
//!         let body = queue.get(&id)?;
//!         println!("{} bytes", body.len());
//!         queue.remove(&id)?;
//!     }
//!     cursor = queue.next(&id)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A consumer that crashes between `lock` and `remove` leaves a stale lock;
//! [`Queue::purge`] hands such elements back once their lock is old enough.
//! Delivery is therefore at-least-once.

pub mod error;
pub mod normal;
pub mod null;
pub mod simple;
pub(crate) mod store;

pub use error::QueueError;
pub use normal::NormalQueue;
pub use null::NullQueue;
pub use simple::SimpleQueue;

use crate::config::QueueConfig;
use crate::message::{Message, SerializeOptions};
use crate::name::{is_valid_owner, random_owner};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default bucket capacity of a [`NormalQueue`].
pub const DEFAULT_MAX_ELEMENTS: usize = 16_000;

/// Default age after which `purge` releases a lock.
pub const DEFAULT_MAX_LOCK_AGE: Duration = Duration::from_secs(600);

/// Default age after which `purge` deletes a temporary file.
pub const DEFAULT_MAX_TEMP_AGE: Duration = Duration::from_secs(300);

/// Opaque identifier of a queue element
///
/// `<bucket>/<name>` for a [`NormalQueue`], `<name>` for a [`SimpleQueue`]
/// and empty for a [`NullQueue`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ElementId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ElementId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Selectable queue variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Bucketed directory queue
    #[default]
    Normal,
    /// Flat directory queue
    Simple,
    /// Discards everything
    Null,
}

impl std::str::FromStr for QueueKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "dqn" => Ok(QueueKind::Normal),
            "simple" | "dqs" => Ok(QueueKind::Simple),
            "null" => Ok(QueueKind::Null),
            other => Err(QueueError::InvalidConfig {
                message: format!("unknown queue kind: {other}"),
            }),
        }
    }
}

/// Construction options shared by the directory-backed variants
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Elements per bucket before a new bucket is started (bucketed variant only)
    pub max_elements: usize,
    /// Consumer token embedded in lock file names; random when unset.
    ///
    /// A stable token lets a restarted consumer find and finish the
    /// elements it had locked before crashing.
    pub owner: Option<String>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_elements: DEFAULT_MAX_ELEMENTS,
            owner: None,
        }
    }
}

impl QueueOptions {
    pub(crate) fn resolve_owner(&self) -> Result<String, QueueError> {
        match &self.owner {
            Some(owner) if is_valid_owner(owner) => Ok(owner.clone()),
            Some(owner) => Err(QueueError::InvalidConfig {
                message: format!(
                    "consumer token {owner:?} must be 1-64 characters of [A-Za-z0-9_-]"
                ),
            }),
            None => Ok(random_owner()),
        }
    }
}

/// Age thresholds for [`Queue::purge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeOptions {
    /// Locks at least this old are released
    pub max_lock_age: Duration,
    /// Temporary files at least this old are deleted
    pub max_temp_age: Duration,
}

impl Default for PurgeOptions {
    fn default() -> Self {
        Self {
            max_lock_age: DEFAULT_MAX_LOCK_AGE,
            max_temp_age: DEFAULT_MAX_TEMP_AGE,
        }
    }
}

/// What a purge sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Stale temporary files deleted
    pub temporary_removed: usize,
    /// Stale locks released
    pub unlocked: usize,
    /// Empty buckets deleted
    pub buckets_removed: usize,
    /// Individual actions that failed (retried on the next purge)
    pub failures: usize,
}

/// Operations shared by every queue variant
///
/// Races with other consumers are reported through return values, never
/// through errors: `lock` returns `false` when another consumer got there
/// first, and enumeration silently skips elements that vanished.
pub trait Queue: Send + Sync {
    /// Durably store `data` as a new element.
    fn add(&self, data: &[u8]) -> Result<ElementId, QueueError>;

    /// Move an existing, fully written file into the queue.
    ///
    /// The file must live on the same filesystem as the queue.
    fn add_path(&self, path: &Path) -> Result<ElementId, QueueError>;

    /// Number of visible and locked elements.
    fn count(&self) -> Result<usize, QueueError>;

    /// Oldest element available to this consumer.
    fn first(&self) -> Result<Option<ElementId>, QueueError>;

    /// Element following `after` in creation order.
    fn next(&self, after: &ElementId) -> Result<Option<ElementId>, QueueError>;

    /// Claim an element; `false` if it is no longer available.
    fn lock(&self, id: &ElementId) -> Result<bool, QueueError>;

    /// Release a held element back to the queue.
    fn unlock(&self, id: &ElementId) -> Result<(), QueueError>;

    /// Restart the age of a held lock.
    fn touch(&self, id: &ElementId) -> Result<(), QueueError>;

    /// Body of a held element.
    fn get(&self, id: &ElementId) -> Result<Vec<u8>, QueueError>;

    /// Delete a held element.
    fn remove(&self, id: &ElementId) -> Result<(), QueueError>;

    /// Reclaim stale temporary files, stale locks and empty buckets.
    fn purge(&self, options: &PurgeOptions) -> Result<PurgeReport, QueueError>;

    /// Lock, read and remove an element in one call.
    ///
    /// `None` if the element could not be locked. If the read fails the
    /// element is unlocked again before the error is returned.
    fn dequeue(&self, id: &ElementId) -> Result<Option<Vec<u8>>, QueueError> {
        if !self.lock(id)? {
            return Ok(None);
        }
        let data = match self.get(id) {
            Ok(data) => data,
            Err(e) => {
                if let Err(unlock_err) = self.unlock(id) {
                    warn!("Failed to unlock {id} after read error: {unlock_err}");
                }
                return Err(e);
            }
        };
        self.remove(id)?;
        Ok(Some(data))
    }
}

/// Iterator over the elements of a queue, driven by `first`/`next`
///
/// Stops after the first error.
pub struct Elements<'a> {
    queue: &'a dyn Queue,
    cursor: Option<ElementId>,
    done: bool,
}

impl<'a> Elements<'a> {
    pub fn new(queue: &'a dyn Queue) -> Self {
        Self {
            queue,
            cursor: None,
            done: false,
        }
    }
}

impl Iterator for Elements<'_> {
    type Item = Result<ElementId, QueueError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = match &self.cursor {
            None => self.queue.first(),
            Some(id) => self.queue.next(id),
        };
        match step {
            Ok(Some(id)) => {
                self.cursor = Some(id.clone());
                Some(Ok(id))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Message-level helpers available on every queue
pub trait MessageQueue: Queue {
    /// Serialize `message` with default options and add it.
    fn add_message(&self, message: &Message) -> Result<ElementId, QueueError> {
        self.add_message_with(message, &SerializeOptions::default())
    }

    /// Serialize `message` with `options` and add it.
    fn add_message_with(
        &self,
        message: &Message,
        options: &SerializeOptions,
    ) -> Result<ElementId, QueueError> {
        let data = message.serialize(options)?;
        self.add(&data)
    }

    /// Decode the message stored in a held element.
    fn get_message(&self, id: &ElementId) -> Result<Message, QueueError> {
        let data = self.get(id)?;
        Ok(Message::deserialize(&data)?)
    }

    /// Lock, decode and remove an element.
    ///
    /// An element that does not decode is unlocked and left in place.
    fn dequeue_message(&self, id: &ElementId) -> Result<Option<Message>, QueueError> {
        if !self.lock(id)? {
            return Ok(None);
        }
        let message = match self.get_message(id) {
            Ok(message) => message,
            Err(e) => {
                if let Err(unlock_err) = self.unlock(id) {
                    warn!("Failed to unlock {id} after decode error: {unlock_err}");
                }
                return Err(e);
            }
        };
        self.remove(id)?;
        Ok(Some(message))
    }
}

impl<Q: Queue + ?Sized> MessageQueue for Q {}

/// Open the queue variant selected by `config`.
pub fn open(config: &QueueConfig) -> Result<Box<dyn Queue>, QueueError> {
    let options = QueueOptions {
        max_elements: config.max_elements,
        owner: config.consumer.clone(),
    };
    match config.kind {
        QueueKind::Null => Ok(Box::new(NullQueue::new())),
        QueueKind::Normal => Ok(Box::new(NormalQueue::new(config.root()?, &options)?)),
        QueueKind::Simple => Ok(Box::new(SimpleQueue::new(config.root()?, &options)?)),
    }
}
