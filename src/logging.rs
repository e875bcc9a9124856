/*!
 * Logging and tracing initialization
 */

use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;
use crate::error::{Result, VigilError};

/// Crates whose events pass the configured level
const VIGIL_TARGETS: [&str; 5] = [
    "vigil",
    "vigil_events",
    "vigil_probe",
    "vigil_armed",
    "vigil_camera",
];

/// Initialize structured logging based on configuration
///
/// `RUST_LOG` takes precedence over the configured level. `debug` forces
/// debug output for the vigil crates.
pub fn init_logging(config: &LoggingConfig, debug: bool) -> Result<()> {
    let log_level = if debug {
        Level::DEBUG
    } else {
        config.level.to_tracing_level()
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(log_level)))
        .map_err(|e| VigilError::Config(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = config.file {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_stdout_logging(env_filter);
    }

    Ok(())
}

fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    let level = level.as_str().to_lowercase();
    directives.extend(VIGIL_TARGETS.iter().map(|t| format!("{}={}", t, level)));
    directives.join(",")
}

/// Initialize logging to stdout/stderr
fn init_stdout_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Initialize JSON logging to a file
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| VigilError::Config(format!("Failed to open log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NONE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Install a test writer once per process
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(Level::DEBUG)));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_every_crate() {
        let directives = default_directives(Level::INFO);

        assert!(directives.starts_with("warn,"));
        for target in VIGIL_TARGETS {
            assert!(directives.contains(&format!("{}=info", target)), "{}", directives);
        }
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_test_logging_is_reentrant() {
        init_test_logging();
        init_test_logging();
        tracing::info!("logging initialised twice without panicking");
    }
}
