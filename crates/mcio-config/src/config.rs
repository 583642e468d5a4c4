//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use mcio_storage::{PackingFormat, TransactionOptions};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Defaults for transactions opened by the tools.
    pub transaction: TransactionOptions,
    /// Record encoding settings.
    pub codec: CodecConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Record encoding configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CodecConfig {
    /// Data version to write chunk records with. `None` keeps the version
    /// each record was read with.
    pub data_version: Option<i32>,
}

impl CodecConfig {
    /// Data version for output, given the version the input was read with.
    pub fn output_data_version(&self, input: i32) -> i32 {
        self.data_version.unwrap_or(input)
    }

    /// Packing format for output, given the input's data version.
    pub fn output_format(&self, input: i32) -> PackingFormat {
        PackingFormat::for_data_version(self.output_data_version(input))
    }
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Per-user config directory, `<platform config dir>/mcio`.
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("mcio"))
        .ok_or(ConfigError::NoConfigDir)
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Re-reads `config.ron`: returns `Some(new_config)` if it differs from
    /// `self`, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use mcio_storage::{BlockState, ConcurrencyPolicy};

    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("policy: OneTimeSnapshot"));
        assert!(ron_str.contains("compact_before_commit: true"));
        assert!(ron_str.contains("log_level: \"info\""));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.transaction.policy = ConcurrencyPolicy::UpdateOtherSection;
        config.transaction.fill_block =
            BlockState::new("minecraft:stone").with_property("variant", "smooth");
        config.codec.data_version = Some(2586);
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(codec: (data_version: Some(2230)))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.transaction, TransactionOptions::default());
        assert_eq!(config.debug, DebugConfig::default());
        assert_eq!(config.codec.data_version, Some(2230));
    }

    #[test]
    fn test_partial_transaction_section() {
        let ron_str = "(transaction: (compact_bit_width_if_possible: false))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert!(!config.transaction.compact_bit_width_if_possible);
        assert!(config.transaction.compact_before_commit);
        assert!(config.transaction.fill_block.is_air());
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true)";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_output_format() {
        let mut codec = CodecConfig::default();
        assert_eq!(codec.output_data_version(2230), 2230);
        assert_eq!(codec.output_format(2230), PackingFormat::Straddled);
        codec.data_version = Some(2586);
        assert_eq!(codec.output_data_version(2230), 2586);
        assert_eq!(codec.output_format(2230), PackingFormat::Aligned);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.transaction.policy = ConcurrencyPolicy::Ignore;
        config.debug.log_level = "trace".to_string();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.transaction.compact_before_commit = false;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert!(!result.unwrap().transaction.compact_before_commit);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_ron_comments_preserved() {
        let ron_str = "// This is a comment\n(\n  // Another comment\n)";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config, Config::default());
    }
}
