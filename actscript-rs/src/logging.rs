//! Tracing setup for hosts that do not install their own subscriber.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: Once = Once::new();

/// Install a `fmt` subscriber filtered by `ACTSCRIPT_LOG`, or `RUST_LOG`
/// when that is unset.  Does nothing if neither is set.
///
/// Safe to call more than once; a subscriber installed by the host wins.
pub fn init() {
    TRACING_INIT.call_once(|| {
        let directives = std::env::var("ACTSCRIPT_LOG").or_else(|_| std::env::var("RUST_LOG"));
        let Ok(directives) = directives else { return };
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(EnvFilter::new(directives))
            .try_init();
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        tracing::debug!("logging initialised");
    }
}
