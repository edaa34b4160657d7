use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A required query parameter was not supplied.
    #[error("Missing argument {0}")]
    MissingParameter(&'static str),

    #[error("Filesystem error at {}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing a frame to the client failed (usually a disconnect).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The archive worker ended without a terminal event.
    #[error("Archive worker stopped without reporting a result: {0}")]
    WorkerLost(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Transport failures cannot be reported on the stream they broke.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
