//! tallyscan - parallel page extraction and OCR for scanned documents.
//!
//! Rasterizes every page of a document, cleans each image up for OCR,
//! recognizes text on a pool of workers and grades the result.

mod cli;

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long exit waits for pages abandoned after a timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "tallyscan=info"
    } else {
        "tallyscan=warn"
    };

    // stdout belongs to the worker protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Built by hand so exit does not wait on a hung page's blocking thread.
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(cli::run());
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}
