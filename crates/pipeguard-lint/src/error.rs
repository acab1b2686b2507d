use std::path::PathBuf;

/// Fatal errors. Policy violations are never reported through this type.
#[derive(Debug, thiserror::Error)]
pub enum LintError {
    /// A definition document is structurally invalid. Aborts the scan.
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Policy or exceptions file is invalid.
    #[error("invalid configuration {origin}: {message}")]
    Config { origin: String, message: String },
}

impl LintError {
    pub(crate) fn parse(path: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn config(origin: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Config {
            origin: origin.into(),
            message: message.to_string(),
        }
    }
}

pub type LintResult<T> = Result<T, LintError>;
