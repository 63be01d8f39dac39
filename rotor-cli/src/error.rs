use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("playlist `{name}` not found under {root}")]
    PlaylistNotFound { name: String, root: PathBuf },

    #[error(transparent)]
    Engine(#[from] rotor_engine::RotorError),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to parse config `{path}`: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("git {operation} failed: {reason}")]
    Git {
        operation: &'static str,
        reason: String,
    },
}

impl CliError {
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn git(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Git {
            operation,
            reason: reason.into(),
        }
    }
}
