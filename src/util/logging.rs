//! Tracing subscriber setup.
//!
//! `RUST_LOG` controls the filter (default `info`), e.g.
//! `RUST_LOG=freight_quote=debug`.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Quote JSON goes to stdout, so diagnostics stay on stderr.
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Verbose, test-captured logging. Safe to call from every test.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
