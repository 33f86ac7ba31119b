use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::DomainError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("invalid problem {path}: {source}")]
    Invalid { source: DomainError, path: PathBuf },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
