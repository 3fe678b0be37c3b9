//! Saving and loading experiment results as `data.json.gz`.

use crate::config::{SimConfig, SimConfigError};
use crate::metrics::ExperimentSummary;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::{error::Error, fmt};

pub const DATA_FILE_NAME: &str = "data.json.gz";

#[derive(Debug)]
pub enum StorageError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    InvalidConfig {
        path: PathBuf,
        source: SimConfigError,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            StorageError::Json { path, source } => {
                write!(f, "{}: malformed data: {source}", path.display())
            }
            StorageError::InvalidConfig { path, source } => {
                write!(f, "{}: stored config is invalid: {source}", path.display())
            }
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::Json { source, .. } => Some(source),
            StorageError::InvalidConfig { source, .. } => Some(source),
        }
    }
}

#[derive(Serialize)]
struct SavedRef<'a> {
    config: &'a SimConfig,
    summary: &'a ExperimentSummary,
}

#[derive(Deserialize)]
struct Saved {
    config: SimConfig,
    summary: ExperimentSummary,
}

/// Path of the data file inside `dir`.
pub fn data_path(dir: &Path) -> PathBuf {
    dir.join(DATA_FILE_NAME)
}

/// Write `config` and `summary` to `dir/data.json.gz`, creating `dir` if needed.
pub fn save(dir: &Path, config: &SimConfig, summary: &ExperimentSummary) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(dir).map_err(|source| StorageError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = data_path(dir);
    let io_err = |source| StorageError::Io {
        path: path.clone(),
        source,
    };
    let file = File::create(&path).map_err(io_err)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, &SavedRef { config, summary }).map_err(|source| {
        StorageError::Json {
            path: path.clone(),
            source,
        }
    })?;
    let mut writer = encoder.finish().map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(path)
}

/// Read back what [`save`] wrote and re-validate the stored config.
pub fn load(dir: &Path) -> Result<(SimConfig, ExperimentSummary), StorageError> {
    let path = data_path(dir);
    let file = File::open(&path).map_err(|source| StorageError::Io {
        path: path.clone(),
        source,
    })?;
    let saved: Saved = serde_json::from_reader(BufReader::new(GzDecoder::new(file))).map_err(
        |source| StorageError::Json {
            path: path.clone(),
            source,
        },
    )?;
    saved
        .config
        .validate()
        .map_err(|source| StorageError::InvalidConfig {
            path: path.clone(),
            source,
        })?;
    Ok((saved.config, saved.summary))
}
