//! Filesystem primitives the queues are built on
//!
//! Everything here is a single system call or a short, crash-safe sequence
//! of them. Higher layers get their atomicity from [`atomic::rename_noreplace`].

pub mod atomic;

pub use atomic::{rename_noreplace, sync_dir, touch, write_synced};
