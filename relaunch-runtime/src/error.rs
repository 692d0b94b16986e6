use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the supervisor runtime. Every variant is a setup failure;
/// errors that happen while supervising are logged where they occur.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid options: {0}")]
    Config(#[from] relaunch_core::ConfigError),

    #[error("cannot determine working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to subscribe to {signal}: {source}")]
    Signal {
        signal: nix::sys::signal::Signal,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("terminal error: {0}")]
    Terminal(#[from] nix::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RuntimeError {
    RuntimeError::Io {
        path: path.into(),
        source,
    }
}
