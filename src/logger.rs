use crate::config::LogConfig;
use crate::errors::DbError;
use crate::query::telemetry::METRICS_TARGET;
use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

fn log_err(e: impl std::fmt::Display) -> DbError {
    DbError::Logging(e.to_string())
}

#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, DbError> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)
        .map_err(log_err)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))
        .map_err(log_err)
}

/// Builds the log4rs configuration: `app.log` for everything, `metrics.log`
/// for the per-query bench lines.
///
/// # Errors
/// Returns an error if the log directory or appenders cannot be created.
pub fn build_config(cfg: &LogConfig) -> Result<Config, DbError> {
    let base = cfg
        .dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    std::fs::create_dir_all(&base)?;
    let lvl = parse_level(&cfg.level);
    let app = rolling(&base, "app", cfg.retention)?;
    let metrics = rolling(&base, "metrics", cfg.retention)?;
    Config::builder()
        .appender(Appender::builder().build("app", Box::new(app)))
        .appender(Appender::builder().build("metrics", Box::new(metrics)))
        .logger(Logger::builder().appender("metrics").additive(false).build(METRICS_TARGET, lvl))
        .build(Root::builder().appender("app").build(lvl))
        .map_err(log_err)
}

/// Installs the logging configuration for the process.
///
/// # Errors
/// Returns an error if the configuration cannot be built or a logger is already installed.
pub fn configure_logging(cfg: &LogConfig) -> Result<(), DbError> {
    let config = build_config(cfg)?;
    log4rs::init_config(config).map_err(log_err)?;
    Ok(())
}

/// Initializes the logging system from a log4rs YAML file.
///
/// # Errors
/// Returns an error if the file cannot be loaded or a logger is already installed.
pub fn init_file(path: &Path) -> Result<(), DbError> {
    log4rs::init_file(path, log4rs::config::Deserializers::default()).map_err(log_err)
}

/// Configure logging from `NEXUS_LINQ_LOG_*` environment variables.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<(), DbError> {
    let cfg = crate::config::DatabaseConfig::default().with_env(|k| std::env::var(k).ok());
    configure_logging(&cfg.log)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level("whatever"), LevelFilter::Info);
    }

    #[test]
    fn builds_config_with_files_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LogConfig { dir: Some(dir.path().to_path_buf()), ..LogConfig::default() };
        assert!(build_config(&cfg).is_ok());
        assert!(dir.path().join("app.log").exists());
        assert!(dir.path().join("metrics.log").exists());
    }
}
