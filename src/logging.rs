use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Resolve the filter: `RUST_LOG` wins over the configured level
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::from_str(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

fn file_layer(writer: NonBlocking, json: bool, filter: EnvFilter) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());

    if json {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    }
}

fn console_layer(filter: EnvFilter) -> BoxedLayer {
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_filter(filter)
        .boxed()
}

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let Some(log_file) = &config.file else {
        // Console logging only
        let builder = tracing_subscriber::fmt()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_env_filter(env_filter(config));
        if config.json {
            builder.json().init();
        } else {
            builder.init();
        }
        return Ok(None);
    };

    let path = Path::new(log_file);
    let (writer, guard) = if config.rotation {
        let appender = tracing_appender::rolling::daily(
            path.parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new(".")),
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("host-hijack.log"),
        );
        tracing_appender::non_blocking(appender)
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", log_file))?;
        tracing_appender::non_blocking(file)
    };

    // Console output stays plain text even when the file is JSON
    let layers = vec![
        file_layer(writer, config.json, env_filter(config)),
        console_layer(env_filter(config)),
    ];
    tracing_subscriber::registry().with(layers).init();

    Ok(Some(guard))
}
