//! Inkpress CLI Library
//!
//! Command implementations and the development server for the inkpress
//! static site generator. The binary entry point lives in `main.rs`.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, watch, check)
//! - [`scheduler`] - Debounced single-flight rebuilds for watch mode
//! - [`server`] - In-memory development server with live reload

pub mod cmd;
pub mod scheduler;
pub mod server;

pub use inkpress_core::{BuildMode, Config};
pub use inkpress_generator::{Assembler, BuildContext, BuildStats};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
///
/// # Example
///
/// ```no_run
/// inkpress::init_tracing(2); // Enable DEBUG level logging
/// ```
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
