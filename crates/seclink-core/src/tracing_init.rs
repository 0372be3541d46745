//! Tracing subscriber setup for programs and tests embedding the channel.
//!
//! The library only emits `tracing` events: `debug` for handshakes and
//! closes, `info` for listener activity, `warn` when a direction is
//! poisoned, `trace` per frame.

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

use crate::error::{Error, Result};

/// Build a subscriber that filters with `filter` (an `EnvFilter` directive
/// such as `"seclink_core=debug"`) and writes to `writer`, as JSON lines
/// when `log_json` is set.
pub fn build_subscriber<W>(
    filter: &str,
    log_json: bool,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));
    if log_json {
        Box::new(registry.with(tracing_subscriber::fmt::layer().json().with_writer(writer)))
    } else {
        Box::new(registry.with(tracing_subscriber::fmt::layer().with_writer(writer)))
    }
}

/// Install the global subscriber, logging to stderr.
///
/// `RUST_LOG` wins over `default_filter` when set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(default_filter: &str, log_json: bool) -> Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into());
    let subscriber = build_subscriber(&filter, log_json, std::io::stderr);
    tracing::subscriber::set_global_default(subscriber).map_err(|e| Error::Tracing(e.to_string()))
}
