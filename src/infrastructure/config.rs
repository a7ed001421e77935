//! Configuration management for the harvester
//!
//! Settings are layered: built-in defaults, then an optional TOML/JSON file,
//! then `RECIPE_HARVESTER__SECTION__KEY` environment overrides.

use crate::infrastructure::http_client::{HttpClientConfig, RatePolicy};
use crate::infrastructure::parsing::SelectorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "RECIPE_HARVESTER";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "RECIPE_HARVESTER_CONFIG";

/// Config file looked up in the working directory and the user config dir
pub const CONFIG_FILE_NAME: &str = "harvester.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Default configuration values
pub mod defaults {
    /// Lower bound of the worker pool
    pub const MIN_WORKERS: usize = 1;

    /// Upper bound of the worker pool
    pub const MAX_WORKERS: usize = 100;

    /// Pages followed per category, first page included
    pub const MAX_PAGES_PER_CATEGORY: u32 = 5;

    /// Capacity of the discovered-item queue
    pub const ITEM_QUEUE_CAPACITY: usize = 2000;

    /// Capacity of the completed-record queue
    pub const RESULT_QUEUE_CAPACITY: usize = 2000;

    /// Interval of the periodic stats log line
    pub const STATS_INTERVAL_SECONDS: u64 = 30;

    /// Request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Home page visited once to pick up session cookies
    pub const WARMUP_URL: &str = "https://www.allrecipes.com/";

    pub const OUTPUT_PATH: &str = "data.json";

    /// Category listing pages harvested by default
    pub const CATEGORIES: [&str; 10] = [
        "https://www.allrecipes.com/recipes/17562/dinner/",
        "https://www.allrecipes.com/recipes/80/main-dish/",
        "https://www.allrecipes.com/recipes/76/appetizers-and-snacks/",
        "https://www.allrecipes.com/recipes/156/bread/",
        "https://www.allrecipes.com/recipes/79/desserts/",
        "https://www.allrecipes.com/recipes/78/breakfast-and-brunch/",
        "https://www.allrecipes.com/recipes/96/salad/",
        "https://www.allrecipes.com/recipes/81/side-dish/",
        "https://www.allrecipes.com/recipes/94/soups-stews-and-chili/",
        "https://www.allrecipes.com/recipes/77/drinks/",
    ];
}

/// Inclusive millisecond range a jittered wait is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: Self = Self::from_millis(0, 0);

    pub const fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn sample(&self) -> Duration {
        crate::infrastructure::disguise::random_delay(
            Duration::from_millis(self.min_ms),
            Duration::from_millis(self.max_ms),
        )
    }
}

/// Pipeline shape and bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Category listing URLs, visited in order
    pub categories: Vec<String>,
    pub max_pages_per_category: u32,
    pub min_workers: usize,
    pub max_workers: usize,
    pub item_queue_capacity: usize,
    pub result_queue_capacity: usize,

    /// Visited once before the first category; empty disables the warm-up
    pub warmup_url: String,

    /// 0 disables the periodic stats log
    pub stats_interval_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            categories: defaults::CATEGORIES.iter().map(ToString::to_string).collect(),
            max_pages_per_category: defaults::MAX_PAGES_PER_CATEGORY,
            min_workers: defaults::MIN_WORKERS,
            max_workers: defaults::MAX_WORKERS,
            item_queue_capacity: defaults::ITEM_QUEUE_CAPACITY,
            result_queue_capacity: defaults::RESULT_QUEUE_CAPACITY,
            warmup_url: defaults::WARMUP_URL.to_string(),
            stats_interval_secs: defaults::STATS_INTERVAL_SECONDS,
        }
    }
}

/// Politeness waits taken by the pipeline itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait armed by a 403/429 answer
    pub rate_limit_cooldown: DelayRange,
    pub pagination_delay: DelayRange,
    pub category_pause: DelayRange,
    pub warmup_pause: DelayRange,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: DelayRange::from_millis(10_000, 20_000),
            pagination_delay: DelayRange::from_millis(2_000, 5_000),
            category_pause: DelayRange::from_millis(5_000, 10_000),
            warmup_pause: DelayRange::from_millis(2_000, 4_000),
        }
    }
}

impl TimingConfig {
    /// No waits at all; used by tests and dry runs against local fixtures
    pub fn immediate() -> Self {
        Self {
            rate_limit_cooldown: DelayRange::ZERO,
            pagination_delay: DelayRange::ZERO,
            category_pause: DelayRange::ZERO,
            warmup_pause: DelayRange::ZERO,
        }
    }
}

/// Where results and metrics are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_path: PathBuf,

    /// Optional JSON metrics document
    pub stats_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(defaults::OUTPUT_PATH),
            stats_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            max_files: 7,
            auto_cleanup_logs: true,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub harvest: HarvestConfig,
    pub discovery_rate: RatePolicy,
    pub detail_rate: RatePolicy,
    pub http: HttpClientConfig,
    pub timing: TimingConfig,
    pub selectors: SelectorConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            harvest: HarvestConfig::default(),
            discovery_rate: RatePolicy::discovery_default(),
            detail_rate: RatePolicy::detail_default(),
            http: HttpClientConfig::default(),
            timing: TimingConfig::default(),
            selectors: SelectorConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the first config file found and the process environment
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(Self::discover_config_file);

        Self::from_sources(path.as_deref(), Self::environment())
    }

    /// Build from an optional file plus an environment source
    pub fn from_sources(
        path: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!("📁 Loading configuration from {:?}", path);
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder.add_source(environment).build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides, e.g. `RECIPE_HARVESTER__HARVEST__MAX_WORKERS=8`
    pub fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("harvest.categories")
            .try_parsing(true)
    }

    /// Get the application configuration directory
    pub fn get_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("recipe-harvester"))
    }

    fn discover_config_file() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        Self::get_config_dir()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let harvest = &self.harvest;

        if harvest.categories.is_empty() {
            return Err(ConfigError::validation("at least one category URL is required"));
        }
        if harvest.min_workers == 0 {
            return Err(ConfigError::validation("min_workers must be at least 1"));
        }
        if harvest.min_workers > harvest.max_workers {
            return Err(ConfigError::validation(format!(
                "min_workers ({}) cannot be greater than max_workers ({})",
                harvest.min_workers, harvest.max_workers
            )));
        }
        if harvest.max_pages_per_category == 0 {
            return Err(ConfigError::validation(
                "max_pages_per_category must be at least 1",
            ));
        }
        if harvest.item_queue_capacity == 0 || harvest.result_queue_capacity == 0 {
            return Err(ConfigError::validation("queue capacities must be at least 1"));
        }
        for (name, policy) in [
            ("discovery_rate", &self.discovery_rate),
            ("detail_rate", &self.detail_rate),
        ] {
            if policy.parallelism == 0 {
                return Err(ConfigError::validation(format!(
                    "{name}.parallelism must be at least 1"
                )));
            }
        }
        if self.http.timeout_seconds == 0 {
            return Err(ConfigError::validation("http.timeout_seconds must be greater than 0"));
        }

        Ok(())
    }
}
