//! Command-line argument parsing for the mcio tools.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// `mcio-inspect` command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(
    name = "mcio-inspect",
    about = "Inspect, compact and convert chunk block storage"
)]
pub struct CliArgs {
    /// Chunk record to read (RON).
    pub input: PathBuf,

    /// Write the resulting chunk record to this path.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Compact every section's palette before reporting and writing.
    #[arg(long)]
    pub compact: bool,

    /// Shrink index arrays to the narrowest width when compacting.
    #[arg(long)]
    pub compact_bit_width: Option<bool>,

    /// Data version to write the output with.
    #[arg(long)]
    pub data_version: Option<i32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(shrink) = args.compact_bit_width {
            self.transaction.compact_bit_width_if_possible = shrink;
        }
        if let Some(version) = args.data_version {
            self.codec.data_version = Some(version);
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["mcio-inspect", "chunk.ron"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = args(&["--data-version", "2586", "--compact-bit-width", "false"]);
        config.apply_cli_overrides(&args);
        assert_eq!(config.codec.data_version, Some(2586));
        assert!(!config.transaction.compact_bit_width_if_possible);
        // Non-overridden fields retain defaults
        assert!(config.transaction.compact_before_commit);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&args(&[]));
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_paths_and_flags() {
        let args = args(&["--compact", "-o", "out.ron", "--log-level", "debug"]);
        assert_eq!(args.input, PathBuf::from("chunk.ron"));
        assert_eq!(args.output, Some(PathBuf::from("out.ron")));
        assert!(args.compact);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(CliArgs::try_parse_from(["mcio-inspect"]).is_err());
    }
}
