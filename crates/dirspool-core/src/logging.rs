//! Process-level logging initialization.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info";

static INIT: OnceLock<()> = OnceLock::new();

/// Directives such as `debug` or `dirspool_core::queue=trace,warn`.
/// Absent or unparsable values fall back to `info`.
fn filter_from(value: Option<&str>) -> EnvFilter {
    value
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install a formatting subscriber filtered by `DIRSPOOL_LOG`.
///
/// Safe to call from every entry point; a subscriber installed elsewhere wins.
pub fn init() {
    INIT.get_or_init(|| {
        let filter = filter_from(std::env::var("DIRSPOOL_LOG").ok().as_deref());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_filter_directives() {
        let hint = |value| filter_from(value).max_level_hint();

        assert_eq!(hint(None), Some(LevelFilter::INFO));
        assert_eq!(hint(Some("  ")), Some(LevelFilter::INFO));
        assert_eq!(hint(Some("debug")), Some(LevelFilter::DEBUG));
        assert_eq!(hint(Some("warn,dirspool_core::queue=trace")), Some(LevelFilter::TRACE));
        assert_eq!(hint(Some("dirspool_core=loud")), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
