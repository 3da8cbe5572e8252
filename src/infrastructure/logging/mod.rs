//! Structured logging, grounded on the teacher's `infrastructure/logging`
//! module: a `tracing`-based subscriber with JSON or pretty output and
//! optional daily-rotated file output.

use anyhow::Result;
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::infrastructure::config::{LogFormat, LoggingConfig};

/// Holds the non-blocking writer guard alive for the process lifetime; the
/// binary must keep this in scope until shutdown.
pub struct LoggerHandle {
    _guard: Option<WorkerGuard>,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the global `tracing` subscriber for one of the three
/// processes (ingress, heartbeat, worker). `process_name` is attached as a
/// constant field so multi-process logs can be demultiplexed downstream.
pub fn init(config: &LoggingConfig, process_name: &str) -> Result<LoggerHandle> {
    let default_level = parse_level(&config.level);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let guard = if let Some(log_dir) = &config.log_dir {
        let file_appender = rolling::daily(log_dir, format!("conclave-{process_name}.log"));
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_current_span(true)
            .with_target(true)
            .with_filter(env_filter.clone());

        let stdout_layer = build_stdout_layer(config.format, env_filter);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stdout_layer)
            .init();

        Some(guard)
    } else {
        let stdout_layer = build_stdout_layer(config.format, env_filter);
        tracing_subscriber::registry().with(stdout_layer).init();
        None
    };

    Ok(LoggerHandle { _guard: guard })
}

fn build_stdout_layer(
    format: LogFormat,
    env_filter: EnvFilter,
) -> Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync + 'static> {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stdout)
            .with_current_span(true)
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    }
}
