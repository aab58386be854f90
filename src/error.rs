//! Error types shared by the utilities.

use std::path::PathBuf;
use std::process::ExitStatus;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error reading or writing \"{}\": {source}", .path.display())]
    FileIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Table error: {0}")]
    Csv(#[from] csv::Error),

    /// Bad user input, reported before any external tool runs.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not parse \"{string}\" as {context}: {reason}")]
    Parse {
        string: String,
        context: &'static str,
        reason: String,
    },

    #[error("Failed to start {program} ({step}): {source}")]
    Spawn {
        step: String,
        program: String,
        source: std::io::Error,
    },

    #[error("{program} failed during {step} with {status}")]
    Tool {
        step: String,
        program: String,
        status: ExitStatus,
    },

    #[error("Download of {accession} looks incomplete: {reason}")]
    IncompleteDownload { accession: String, reason: String },

    #[error("{failed} of {total} merge jobs failed")]
    MergeFailed { failed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileIo {
            path: path.into(),
            source,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
