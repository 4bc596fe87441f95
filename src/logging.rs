//! Logging prelude module for convenient access to tracing macros.
//!
//! Re-exports the common tracing macros so modules can `use crate::logging::*;`
//! and log consistently across the codebase.

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// By default, logs at INFO level and above are displayed. Control the log
/// level with the `RUST_LOG` environment variable:
///
/// ```bash
/// RUST_LOG=debug hubsync serve
/// RUST_LOG=hubsync::server=debug,hubsync::reconcile=trace hubsync serve
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
