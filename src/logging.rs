use crate::error::{AnalyzerError, Result};
use env_logger::{Builder, Env};
use log::{self, LevelFilter};
use chrono::Local;
use std::io::Write;
use yansi::Paint;

/// Initializes the CLI logging system with the specified log level
///
/// Valid log levels are: off, error, warn, info, debug, trace; anything
/// else means info. `RUST_LOG` wins when it is set.
pub fn init(log_level: &str) -> Result<()> {
    let env = Env::default()
        .filter_or("RUST_LOG", parse_log_level(log_level).to_string())
        .write_style_or("RUST_LOG_STYLE", "auto");

    Builder::from_env(env)
        .format(|buf, record| {
            writeln!(buf, "{}", format_log(record))
        })
        .try_init()
        .map_err(|e| AnalyzerError::Config(format!("Logger already initialised: {}", e)))
}

/// Formats a log record into a structured string
///
/// Returns a formatted string with timestamp, level, and message
pub fn format_log(record: &log::Record) -> String {
    let level = match record.level() {
        log::Level::Error => Paint::red("ERROR").bold(),
        log::Level::Warn => Paint::yellow("WARN ").bold(),
        log::Level::Info => Paint::cyan("INFO ").bold(),
        log::Level::Debug => Paint::blue("DEBUG").bold(),
        log::Level::Trace => Paint::new("TRACE"),
    };

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let target = if !record.target().is_empty() {
        record.target()
    } else {
        record.module_path().unwrap_or("unknown")
    };

    format!(
        "[{}] {} [{}] {}",
        timestamp,
        level,
        target,
        record.args()
    )
}

/// Parses a log level string into a LevelFilter
///
/// Returns the corresponding LevelFilter, defaulting to Info for invalid strings
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
