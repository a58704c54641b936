//! Process-level logging setup
//!
//! Library components never install a subscriber themselves; they log into
//! the span they were constructed with. Applications call `init_logging`
//! once at startup.

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a caller directive is usable
pub const DEFAULT_DIRECTIVE: &str = "meld=info";

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over `default_directive`. Returns `false` if a global
/// subscriber was already installed.
pub fn init_logging(default_directive: &str) -> bool {
    fmt()
        .with_env_filter(filter(default_directive))
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Subscriber for tests: writes through the test harness capture and
/// tolerates being called from every test
pub fn try_init_test_logging() {
    let _ = fmt()
        .with_env_filter(filter("meld=debug"))
        .with_test_writer()
        .try_init();
}
