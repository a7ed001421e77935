//! Infrastructure layer: configuration, HTTP access, parsing and output
//!
//! Everything that touches the network, the filesystem or process-wide
//! state lives here; the pipeline in `crawling` only sees the traits.

pub mod config;
pub mod disguise;
pub mod export;
pub mod http_client;
pub mod logging;
pub mod parsing;

pub use config::{AppConfig, ConfigError};
pub use disguise::DisguisePolicy;
pub use http_client::{
    BrowserSession, FetchError, FetcherSource, HttpClient, HttpClientConfig, PageFetcher, RatePolicy,
    SharedFetcher,
};
pub use logging::{get_log_directory, init_logging_with_config};
pub use parsing::{ListingParser, ParsingError, RecipeParser, SelectorConfig};
