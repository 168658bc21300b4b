//! Structured logging setup.
//!
//! Initializes a `tracing_subscriber` stack from [`crate::config::LoggingConfig`]:
//! an `EnvFilter` built from the configured level (overridable via
//! `RUST_LOG`), and either a text or JSON formatter. When `log_dir` is
//! given, logs are additionally written to a daily-rolling file via
//! `tracing-appender`.

use std::path::Path;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::LoggingConfig;

/// Guard returned by [`init`]; dropping it flushes the non-blocking file
/// appender, if one was configured.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Configure the global `tracing` subscriber. Call once, near the start of
/// `main`.
pub fn init(config: &LoggingConfig, log_dir: Option<&Path>) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let json = config.format == "json";

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "carnotstitch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stdout_layer = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    LoggingGuard { _file_guard: guard }
}
