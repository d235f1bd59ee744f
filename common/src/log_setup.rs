use std::path::Path;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides `base_level`. Console output always; when `log_dir` is
/// given, a daily rolling `detection.*.log` file is written there as well.
///
/// # Panics
///
/// Panics if the filter is invalid, the log directory cannot be created, or a
/// global subscriber is already installed.
pub fn setup_logging(base_level: &str, log_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(base_level))
        .unwrap_or_else(|e| panic!("Invalid log filter: {}", e));

    let console_writer = std::io::stdout.and(std::io::stderr.with_min_level(Level::WARN));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .with_writer(console_writer);

    let file_layer = log_dir.map(|dir| {
        std::fs::create_dir_all(dir)
            .unwrap_or_else(|e| panic!("Failed to create logs directory: {}", e));

        let file_appender = tracing_appender::rolling::Builder::new()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("detection")
            .filename_suffix("log")
            .max_log_files(5)
            .build(dir)
            .unwrap_or_else(|e| panic!("Failed to create log file appender: {}", e));

        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        if LOG_GUARD.set(guard).is_err() {
            panic!("Logging already initialized");
        }

        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .unwrap_or_else(|e| panic!("Logger initialization failed: {}", e));
}
