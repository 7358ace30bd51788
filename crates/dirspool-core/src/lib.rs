//! Multi-process directory queues
//!
//! `dirspool` stores messages as files in a directory tree and coordinates
//! any number of producers and consumers through atomic renames alone.
//! See [`queue`] for the queue variants and consumer protocol and
//! [`message`] for the JSON message envelope stored in queue elements.
//!
//! ```rust,no_run
//! use dirspool_core::config::{resolve_config, ConfigOverrides};
//! use dirspool_core::{queue, Message, MessageQueue};
//!
//! # fn main() -> anyhow::Result<()> {
//! dirspool_core::logging::init();
//! let config = resolve_config(&ConfigOverrides::default())?;
//! let spool = queue::open(&config.queue)?;
//! spool.add_message(&Message::text("hello").with_header("subject", "greeting"))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod home;
pub mod io;
pub mod logging;
pub mod message;
pub mod name;
pub mod queue;

pub use message::{Body, Message, MessageError, SerializeOptions};
pub use queue::{
    open, ElementId, Elements, MessageQueue, NormalQueue, NullQueue, PurgeOptions, PurgeReport,
    Queue, QueueError, QueueKind, QueueOptions, SimpleQueue,
};
