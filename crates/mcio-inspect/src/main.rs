//! Chunk block storage inspector.
//!
//! Reads a chunk record in RON form, reports per-section palette statistics
//! and optionally compacts every section and writes the record back out,
//! converting between packing formats when a data version is given.
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.

mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use mcio_config::{CliArgs, Config, default_config_dir};
use mcio_storage::{Chunk, ChunkRecord, CodecError, StorageError};
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
enum InspectError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse chunk record {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("failed to serialize chunk record: {0}")]
    Serialize(#[from] ron::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(|| match default_config_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                eprintln!("{e}, running without a config file");
                None
            }
        });

    // Load or create config, then apply CLI overrides
    let mut config = match &config_dir {
        Some(dir) => Config::load_or_create(dir).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}, using defaults");
            Config::default()
        }),
        None => Config::default(),
    };
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.as_ref().map(|dir| dir.join("logs"));
    mcio_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    match run(&args, &config) {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "inspection failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Loads, optionally compacts and re-encodes the input chunk, returning the
/// rendered statistics.
fn run(args: &CliArgs, config: &Config) -> Result<String, InspectError> {
    let mut chunk = Chunk::from_record(read_record(&args.input)?)?;
    info!(
        path = %args.input.display(),
        data_version = chunk.data_version(),
        sections = chunk.existing_sections().count(),
        "loaded chunk record"
    );

    if args.compact {
        let compacted = chunk.compact_all_with(&config.transaction)?;
        info!(
            written = compacted.written.len(),
            removed = compacted.removed.len(),
            "compacted chunk"
        );
    }

    let stats = report::collect(&mut chunk)?;
    let rendered = report::render(chunk.data_version(), &stats);

    if let Some(output) = &args.output {
        let data_version = config.codec.output_data_version(chunk.data_version());
        chunk.set_data_version(data_version)?;
        write_record(output, &chunk.to_record()?)?;
        info!(
            path = %output.display(),
            data_version,
            format = ?chunk.format(),
            "wrote chunk record"
        );
    }
    Ok(rendered)
}

fn read_record(path: &Path) -> Result<ChunkRecord, InspectError> {
    let contents = std::fs::read_to_string(path).map_err(|source| InspectError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| InspectError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_record(path: &Path, record: &ChunkRecord) -> Result<(), InspectError> {
    let pretty = ron::ser::PrettyConfig::new()
        .depth_limit(2)
        .enumerate_arrays(false);
    let serialized = ron::ser::to_string_pretty(record, pretty)?;
    std::fs::write(path, serialized).map_err(|source| InspectError::Write {
        path: path.to_path_buf(),
        source,
    })
}
