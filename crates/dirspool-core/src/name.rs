//! Unique, sortable element names
//!
//! Every element file in a queue is named by [`NameGenerator::next`]. Names
//! have a fixed width so that plain string comparison orders them by
//! creation time:
//!
//! ```text
//! 0006153b1e9a3c-0000002a-9f2c41d7000012e4b81c07aa
//! |              |        |       |       |
//! time (µs)      seq      host    pid     random
//! ```
//!
//! The last 24 hex digits are the process token. Uniqueness never depends
//! on the clock: two processes differ in their token and two names from
//! the same process differ in their sequence number. The clock only
//! provides ordering, and within one process that ordering is monotonic
//! even when the system clock steps backwards.
//!
//! Alongside plain names, queue directories hold temporary files
//! (`<name>.tmp`) and locked files (`<name>.<owner>.lck`). [`parse_entry`]
//! classifies directory entries into those states.

use std::sync::{Mutex, OnceLock, PoisonError};

/// Suffix of an element file that is still being written.
pub const TEMPORARY_SUFFIX: &str = ".tmp";

/// Suffix of an element file claimed by a consumer.
pub const LOCKED_SUFFIX: &str = ".lck";

/// Length of a generated element name.
pub const NAME_LEN: usize = 14 + 1 + 8 + 1 + 24;

const MAX_OWNER_LEN: usize = 64;

/// Generator of collision-resistant element names
///
/// Most callers use the process-wide instance from [`NameGenerator::global`].
#[derive(Debug)]
pub struct NameGenerator {
    token: String,
    state: Mutex<Clock>,
}

#[derive(Debug, Default)]
struct Clock {
    last_tick: u64,
    seq: u32,
}

impl NameGenerator {
    /// Create a generator with a fresh process token.
    pub fn new() -> Self {
        Self::with_token(process_token())
    }

    fn with_token(token: String) -> Self {
        Self {
            token,
            state: Mutex::new(Clock::default()),
        }
    }

    /// The generator shared by every queue in this process.
    pub fn global() -> &'static NameGenerator {
        static GLOBAL: OnceLock<NameGenerator> = OnceLock::new();
        GLOBAL.get_or_init(NameGenerator::new)
    }

    /// The per-process part of every name produced by this generator.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Produce the next name.
    ///
    /// Never fails. If the system clock is unreadable the time component
    /// stays at the last issued tick.
    pub fn next(&self) -> String {
        let mut clock = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = current_tick().unwrap_or(clock.last_tick);
        clock.last_tick = clock.last_tick.max(now);
        let seq = clock.seq;
        clock.seq = clock.seq.wrapping_add(1);
        format!("{:014x}-{seq:08x}-{}", clock.last_tick, self.token)
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Microseconds since the Unix epoch, or `None` if the clock is before it.
fn current_tick() -> Option<u64> {
    u64::try_from(chrono::Utc::now().timestamp_micros()).ok()
}

fn process_token() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digest = blake3::hash(host.as_bytes());
    let bytes = digest.as_bytes();
    let host_id = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    format!(
        "{host_id:08x}{:08x}{:08x}",
        std::process::id(),
        rand::random::<u32>()
    )
}

/// Whether `name` has the exact shape produced by [`NameGenerator::next`].
pub fn is_element_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() != NAME_LEN {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        14 | 23 => *b == b'-',
        _ => matches!(b, b'0'..=b'9' | b'a'..=b'f'),
    })
}

/// Whether `owner` can be embedded in a locked file name.
pub fn is_valid_owner(owner: &str) -> bool {
    !owner.is_empty()
        && owner.len() <= MAX_OWNER_LEN
        && owner
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// A random consumer token: `<pid>-<random>` in hex.
pub fn random_owner() -> String {
    format!("{:x}-{:08x}", std::process::id(), rand::random::<u32>())
}

/// File name of the locked form of `name` held by `owner`.
pub fn locked_name(name: &str, owner: &str) -> String {
    format!("{name}.{owner}{LOCKED_SUFFIX}")
}

/// File name of the temporary form of `name`.
pub fn temporary_name(name: &str) -> String {
    format!("{name}{TEMPORARY_SUFFIX}")
}

/// State of a queue directory entry, derived from its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryName<'a> {
    /// Published element, available to every consumer
    Visible(&'a str),
    /// Element still being written
    Temporary(&'a str),
    /// Element claimed by `owner`
    Locked { name: &'a str, owner: &'a str },
}

impl<'a> EntryName<'a> {
    /// The element name, whatever the state.
    pub fn name(&self) -> &'a str {
        match *self {
            EntryName::Visible(name) | EntryName::Temporary(name) => name,
            EntryName::Locked { name, .. } => name,
        }
    }
}

/// Classify a directory entry; `None` for anything that is not an element.
pub fn parse_entry(file_name: &str) -> Option<EntryName<'_>> {
    if is_element_name(file_name) {
        return Some(EntryName::Visible(file_name));
    }
    if let Some(name) = file_name.strip_suffix(TEMPORARY_SUFFIX) {
        return is_element_name(name).then_some(EntryName::Temporary(name));
    }
    let rest = file_name.strip_suffix(LOCKED_SUFFIX)?;
    let (name, owner) = rest.split_once('.')?;
    (is_element_name(name) && is_valid_owner(owner)).then_some(EntryName::Locked { name, owner })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_name_shape() {
        let generator = NameGenerator::new();
        let name = generator.next();
        assert_eq!(name.len(), NAME_LEN);
        assert!(is_element_name(&name));
        assert!(name.ends_with(generator.token()));
    }

    #[test]
    fn test_names_sort_in_creation_order() {
        let generator = NameGenerator::new();
        let names: Vec<String> = (0..2000).map(|_| generator.next()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_names_unique_across_threads() {
        let generator = Arc::new(NameGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || (0..500).map(|_| generator.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(seen.insert(name), "duplicate name generated");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_distinct_generators_never_collide_in_same_tick() {
        let a = NameGenerator::with_token(format!("{:024x}", 1));
        let b = NameGenerator::with_token(format!("{:024x}", 2));
        let from_a: HashSet<String> = (0..100).map(|_| a.next()).collect();
        assert!((0..100).map(|_| b.next()).all(|n| !from_a.contains(&n)));
    }

    #[test]
    fn test_clock_regression_keeps_order() {
        let generator = NameGenerator::new();
        let first = generator.next();
        {
            let mut clock = generator.state.lock().unwrap();
            // Pretend an earlier call saw a clock far in the future.
            clock.last_tick += 60_000_000;
        }
        let second = generator.next();
        let third = generator.next();
        assert!(first < second);
        assert!(second < third);
        assert_eq!(second[..14], third[..14]);
    }

    #[test]
    fn test_global_generator_is_shared() {
        assert_eq!(NameGenerator::global().token(), NameGenerator::global().token());
    }

    #[test]
    fn test_is_element_name_rejects_malformed() {
        assert!(!is_element_name(""));
        assert!(!is_element_name("00000000"));
        let name = NameGenerator::new().next();
        assert!(!is_element_name(&name.to_uppercase()));
        assert!(!is_element_name(&name.replace('-', "_")));
        assert!(!is_element_name(&format!("{name}0")));
    }

    #[test]
    fn test_parse_entry_states() {
        let name = NameGenerator::new().next();
        assert_eq!(parse_entry(&name), Some(EntryName::Visible(name.as_str())));

        let tmp = temporary_name(&name);
        assert_eq!(parse_entry(&tmp), Some(EntryName::Temporary(name.as_str())));

        let lck = locked_name(&name, "worker-1");
        assert_eq!(
            parse_entry(&lck),
            Some(EntryName::Locked {
                name: name.as_str(),
                owner: "worker-1"
            })
        );
        assert_eq!(parse_entry(&lck).unwrap().name(), name);

        assert_eq!(parse_entry("README"), None);
        assert_eq!(parse_entry(&format!("{name}.bad.owner.lck")), None);
        assert_eq!(parse_entry(&format!("{name}..lck")), None);
    }

    #[test]
    fn test_owner_validation() {
        assert!(is_valid_owner("worker_1"));
        assert!(is_valid_owner(&random_owner()));
        assert!(!is_valid_owner(""));
        assert!(!is_valid_owner("a.b"));
        assert!(!is_valid_owner("a/b"));
        assert!(!is_valid_owner(&"x".repeat(65)));
    }
}
