//! # refine-events
//!
//! Lifecycle events for the improvement loop and the sinks that receive
//! them.
//!
//! ## Key Types
//!
//! - [`LoopEvent`] - Structured lifecycle events, correlated by run id
//! - [`EventSink`] - Best-effort, non-blocking event destination
//! - [`ConsoleSink`] / [`ChannelSink`] / [`NullSink`] - Provided sinks
//! - [`EventFormat`] - Console formats (Pretty, JSON, Compact)

mod events;
mod sink;

pub use events::{EventFormat, LoopEvent, Phase};
pub use sink::{ChannelSink, ConsoleSink, EventSink, NullSink};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the application
pub fn init_tracing(level: &str, format: EventFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        EventFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false))
                .init();
        }
        EventFormat::Pretty | EventFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false))
                .init();
        }
    }
}
