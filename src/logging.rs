//! Structured logging setup
//!
//! Stdout carries the JSON-RPC stream, so every layer writes to stderr.
//! `RUST_LOG` takes precedence over the default filter.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for the given verbosity.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "google_mcp=debug"
    } else {
        "google_mcp=info"
    }
}

/// Initialize the global subscriber.
///
/// # Arguments
///
/// * `verbose` - Raise the default level to debug
/// * `json` - Emit JSON lines (with span context) instead of human-readable text
///
/// # Examples
///
/// ```no_run
/// use google_mcp::logging::init_logging;
///
/// init_logging(false, true).unwrap();
/// ```
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose)))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let stderr_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr);
        registry.with(stderr_layer).try_init()?;
    } else {
        let stderr_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(false)
            .with_writer(std::io::stderr);
        registry.with(stderr_layer).try_init()?;
    }

    Ok(())
}
