use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse category token '{token}' in row {row}: {reason}")]
    Parse {
        row: usize,
        token: String,
        reason: String,
    },

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Failed to write '{destination}': {reason}")]
    Write { destination: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    pub fn read(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        EtlError::Read {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(row: usize, token: &str, reason: impl ToString) -> Self {
        EtlError::Parse {
            row,
            token: token.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write(destination: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        EtlError::Write {
            destination: destination.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
