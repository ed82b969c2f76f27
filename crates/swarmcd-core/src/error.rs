use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwarmcdError {
    #[error("failed to initialize revision store at '{location}': {reason}")]
    StorageInit { location: String, reason: String },

    #[error("revision store: {0}")]
    Storage(String),

    #[error("revision store connection is closed")]
    NotConnected,

    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("stack '{stack}' references unknown repo '{repo}'")]
    UnknownRepo { stack: String, repo: String },

    #[error("{0}")]
    Reconcile(String),

    #[error("'{program}' exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("required executable not found on PATH: {0}")]
    ToolNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SwarmcdError>;
