use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("worker pool is already initialized")]
    AlreadyInitialized,

    #[error("worker pool has not been started")]
    NotStarted,

    #[error("worker pool disconnected before all results arrived")]
    Disconnected,

    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] subprocess::PopenError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid configuration file: {0}")]
    ConfigFormat(#[from] toml::de::Error),

    #[error("test suite line {line}: {message}")]
    Suite { line: usize, message: String },

    #[error("artifact already exists: {}", .0.display())]
    ArtifactExists(PathBuf),

    #[error("malformed program: {0}")]
    Program(#[from] gc_gen::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
