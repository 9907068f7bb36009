//! Structured Logging Configuration
//!
//! Provides configurable logging with:
//! - JSON output for log shipping (LOG_FORMAT=json)
//! - Human-readable output with timestamps (default)
//!
//! # Usage
//!
//! ```rust,ignore
//! use br_common::logging::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!(path = %path.display(), "Processing file");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: Set to "json" for JSON output, anything else for text (default: text)
//! - `RUST_LOG`: Standard log level filter (default: info)
//!   Examples: `RUST_LOG=debug`, `RUST_LOG=br_dispatch=trace,reqwest=info`

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging.
///
/// Reads LOG_FORMAT to pick the output format and RUST_LOG for level
/// filtering (defaults to INFO). Safe to call more than once; later calls
/// are ignored.
pub fn init_logging() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let env_filter = default_filter();

    if log_format.eq_ignore_ascii_case("json") {
        init_json_logging(env_filter);
    } else {
        init_text_logging(env_filter);
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_json_logging(env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .flatten_event(true),
        )
        .try_init();
}

fn init_text_logging(env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_ansi(true),
        )
        .try_init();
}
