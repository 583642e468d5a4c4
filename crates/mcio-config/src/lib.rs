//! Configuration for the mcio tools.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line. Serialization is forward and backward compatible: unknown
//! fields are ignored and missing ones take their defaults.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CodecConfig, Config, DebugConfig, default_config_dir};
pub use error::ConfigError;
