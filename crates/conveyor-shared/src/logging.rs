//! # Tracing Initialization
//!
//! Structured logging setup shared by every binary in this workspace.
//! Verbosity is controlled by `RUST_LOG`; no application-specific flag
//! exists for it so that operators reuse the same knob across services.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global tracing subscriber reading `RUST_LOG`, defaulting to
/// `info` for this crate's binaries and `warn` for dependencies.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,conveyor_orchestration=info,conveyor_shared=info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .ok();
}
