//! Tracing subscriber setup for the binary.
//!
//! Library code only emits `tracing` events. `RUST_LOG`, when set, takes
//! precedence over the configured level.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber at `level`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

