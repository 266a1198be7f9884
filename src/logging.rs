//! Ambient logging setup for the crate's own tests and for demo binaries.
//!
//! A library must not install a global subscriber for its host; this is a
//! thin, opt-in `tracing-subscriber` wrapper, simplified from the teacher's
//! `bin/hurry/log.rs` `make_logger` (no flame-graph or `tracing-error` layer:
//! those exist there for the CLI's profiling flag, which has no equivalent
//! here).

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a `KILN_LOG`-driven `tracing-subscriber` for the current process,
/// once. Safe to call repeatedly (e.g. once per test); subsequent calls are
/// no-ops.
pub fn init_for_tests() {
    INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_env_var("KILN_LOG")
            .from_env_lossy();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
