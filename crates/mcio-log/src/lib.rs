//! Structured logging for the mcio tools.
//!
//! Library crates emit `tracing` events (commits, conflicts, compaction);
//! this crate installs the subscriber that renders them. Console output is
//! human-readable; debug builds also write JSON lines to a file for
//! post-mortem analysis. The level comes from `RUST_LOG`, then from the
//! config's `debug.log_level`.

use std::path::Path;

use mcio_config::Config;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

/// File name of the JSON log written in debug builds.
pub const LOG_FILE_NAME: &str = "mcio.log";

/// Filter used when neither `RUST_LOG` nor the config supplies one.
pub const DEFAULT_FILTER: &str = "info";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - whether to write the JSON log file
/// * `config` - optional configuration supplying the log level
///
/// ```no_run
/// use mcio_config::Config;
/// use mcio_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        subscriber.with(json_file_layer(log_file)).init();
        return;
    }

    subscriber.init();
}

/// Filter directives from the config's log level, or [`DEFAULT_FILTER`].
pub fn filter_directives(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// `EnvFilter` built from [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// JSON-lines layer writing to `file`, without ANSI colour codes.
fn json_file_layer<S>(file: std::fs::File) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_timer(fmt::time::uptime())
        .json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        let filter = default_env_filter();
        assert!(format!("{filter}").contains("info"));
    }

    #[test]
    fn test_filter_from_config() {
        let mut config = Config::default();
        assert_eq!(filter_directives(Some(&config)), "info");

        config.debug.log_level = "warn,mcio_storage=trace".to_string();
        assert_eq!(filter_directives(Some(&config)), "warn,mcio_storage=trace");

        config.debug.log_level.clear();
        assert_eq!(filter_directives(Some(&config)), DEFAULT_FILTER);
        assert_eq!(filter_directives(None), DEFAULT_FILTER);
    }

    #[test]
    fn test_env_filter_parsing() {
        let valid_filters = [
            "info",
            "debug,mcio_storage=trace",
            "warn,mcio_storage::transaction=debug",
            "error",
        ];
        for filter_str in &valid_filters {
            let result = EnvFilter::try_from(*filter_str);
            assert!(result.is_ok(), "Failed to parse filter: {filter_str}");
        }
    }

    #[test]
    fn test_json_file_layer_writes_structured_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let file = std::fs::File::create(&path).unwrap();

        let subscriber = tracing_subscriber::registry().with(json_file_layer(file));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(section = 3, "committed block transaction");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value =
            serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["fields"]["message"], "committed block transaction");
        assert_eq!(line["fields"]["section"], 3);
        assert!(!contents.contains('\u{1b}'));
    }

    #[test]
    fn test_storage_events_reach_file_layer() {
        use mcio_storage::{BlockState, Chunk, ConcurrencyPolicy};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let file = std::fs::File::create(&path).unwrap();

        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new("mcio_storage=debug"))
            .with(json_file_layer(file));
        tracing::subscriber::with_default(subscriber, || {
            let mut chunk = Chunk::new();
            let mut t1 = chunk
                .open_transaction(ConcurrencyPolicy::OneTimeSnapshot)
                .unwrap();
            let mut t2 = chunk
                .open_transaction(ConcurrencyPolicy::OneTimeSnapshot)
                .unwrap();
            t1.set(0, 0, 0, &BlockState::new("minecraft:stone")).unwrap();
            t1.commit(&mut chunk).unwrap();
            t2.set(0, 0, 0, &BlockState::new("minecraft:dirt")).unwrap();
            assert!(t2.commit(&mut chunk).is_err());
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let events: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert!(events.iter().any(|e| {
            e["level"] == "DEBUG" && e["fields"]["message"] == "committed block transaction"
        }));
        assert!(events.iter().any(|e| {
            e["level"] == "WARN" && e["fields"]["section"] == 0
        }));
    }
}
