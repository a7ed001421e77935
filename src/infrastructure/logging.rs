//! Logging system configuration and initialization
//!
//! - File logging with rotation of the previous run's file
//! - Configuration file based log level control
//! - Structured JSON logging (optional)
//! - Console and file output support
//! - Local timezone timestamps

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

/// Name of the active log file; earlier runs are renamed with a timestamp
pub const LOG_FILE_NAME: &str = "recipe-harvester.log";

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Local time with millisecond precision
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %z"))
    }
}

/// Configured directory, or `logs/` next to the executable
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.log_dir {
        return dir.clone();
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Rename the previous run's log file with its timestamp
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<Option<PathBuf>> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(None);
    }

    let metadata = std::fs::metadata(&log_file_path)
        .map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let datetime: DateTime<Local> = file_time.into();

    let file_stem = log_file_name.trim_end_matches(".log");
    let timestamped_name = format!("{}.{}.log", file_stem, datetime.format("%Y%m%dT%H%M%S"));
    let timestamped_path = log_dir.join(&timestamped_name);

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;

    Ok(Some(timestamped_path))
}

/// Keep only the newest `max_files` log files; returns how many were removed
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.extension().is_some_and(|ext| ext == "log");
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files as usize) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }

    Ok(removed)
}

/// Default filter: our level for the crate, dependencies kept quiet unless TRACE
fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", level, e))?;

    if !level.to_lowercase().contains("trace") {
        for directive in [
            "reqwest=info",
            "hyper=warn",
            "hyper_util=warn",
            "h2=warn",
            "html5ever=warn",
            "selectors=warn",
            "tokio=info",
        ] {
            filter = filter.add_directive(directive.parse()?);
        }
        filter = filter.add_directive(format!("recipe_harvester={}", level).parse()?);
    }

    Ok(filter)
}

/// Initialize logging with custom configuration
///
/// `RUST_LOG` overrides the configured filter entirely:
/// ```bash
/// RUST_LOG="debug,reqwest=debug,hyper=debug" recipe-harvester
/// ```
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = build_env_filter(&config.level)?;
    let log_dir = get_log_directory(config);

    let mut rotated = None;
    let mut removed = 0;
    let file_writer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        rotated = rotate_existing_log_file(&log_dir, LOG_FILE_NAME)?;
        if config.auto_cleanup_logs {
            removed = cleanup_old_logs(&log_dir, config.max_files)?;
        }

        let (writer, guard) = non_blocking(rolling::never(&log_dir, LOG_FILE_NAME));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry is poisoned"))?
            .push(guard);
        Some(writer)
    } else {
        None
    };

    let (json_file_layer, plain_file_layer) = match file_writer {
        Some(writer) if config.json_format => (
            Some(
                fmt::Layer::new()
                    .json()
                    .with_writer(writer)
                    .with_timer(LocalTimeFormatter)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false),
            ),
            None,
        ),
        Some(writer) => (
            None,
            Some(
                fmt::Layer::new()
                    .with_writer(writer)
                    .with_timer(LocalTimeFormatter)
                    .with_target(false)
                    .with_ansi(false),
            ),
        ),
        None => (None, None),
    };

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    });

    Registry::default()
        .with(env_filter)
        .with(json_file_layer)
        .with(plain_file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
        if let Some(path) = rotated {
            info!("Rotated previous log file to {:?}", path);
        }
        if removed > 0 {
            info!("Removed {} old log files (keeping {})", removed, config.max_files);
        }
    }
    info!("JSON format: {}", config.json_format);

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Recipe Harvester System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(parallelism) = std::thread::available_parallelism() {
        info!("Logical CPUs: {}", parallelism);
    }
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("============================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(config.file_output);
    }

    #[test]
    fn test_log_directory_prefers_configured_path() {
        let config = LoggingConfig {
            log_dir: Some(PathBuf::from("/tmp/harvest-logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(get_log_directory(&config), PathBuf::from("/tmp/harvest-logs"));

        let fallback = get_log_directory(&LoggingConfig::default());
        assert!(fallback.ends_with("logs"));
    }

    #[test]
    fn test_rotation_renames_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOG_FILE_NAME), "previous run").unwrap();

        let rotated = rotate_existing_log_file(dir.path(), LOG_FILE_NAME).unwrap().unwrap();

        assert!(!dir.path().join(LOG_FILE_NAME).exists());
        let name = rotated.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("recipe-harvester."));
        assert!(name.ends_with(".log"));
        assert_eq!(std::fs::read_to_string(rotated).unwrap(), "previous run");
    }

    #[test]
    fn test_rotation_without_previous_log_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert!(rotate_existing_log_file(dir.path(), LOG_FILE_NAME).unwrap().is_none());
    }

    #[test]
    fn test_cleanup_keeps_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for age in 0..5u64 {
            let path = dir.path().join(format!("run-{age}.log"));
            let file = std::fs::File::create(&path).unwrap();
            file.set_modified(now - Duration::from_secs(age * 60)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let removed = cleanup_old_logs(dir.path(), 2).unwrap();

        assert_eq!(removed, 3);
        assert!(dir.path().join("run-0.log").exists());
        assert!(dir.path().join("run-1.log").exists());
        assert!(!dir.path().join("run-4.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_default_filter_builds_for_every_level() {
        for level in ["error", "warn", "info", "debug", "trace"] {
            assert!(build_env_filter(level).is_ok(), "level {level}");
        }
    }

    #[test]
    fn test_no_output_is_an_error() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }
}
