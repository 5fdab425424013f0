//! Tracing initialization.
//!
//! Controlled by `PATCHDANCE_LOG`:
//! - unset → no-op (tracing disabled, zero overhead)
//! - `"stderr"` → JSON spans/events to stderr
//! - any other value → treated as an `EnvFilter` directive with the JSON
//!   stderr writer (e.g. `PATCHDANCE_LOG=patchdance=debug`)
//!
//! Library users embedding the engine in their own binary should install
//! their own subscriber instead and leave this untouched.

use tracing_subscriber::EnvFilter;

/// Initialize tracing from the environment. Safe to call once per
/// process; a second call is a no-op (the global subscriber is already
/// set).
pub fn init() {
    let Ok(value) = std::env::var("PATCHDANCE_LOG") else {
        return;
    };
    if value.is_empty() {
        return;
    }

    let filter = if value == "stderr" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new(value)
    };

    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .try_init();
}
