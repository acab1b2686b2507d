//! Error types for the verifier.

/// Verifier errors.
///
/// These never escape [`crate::RefVerifier::verify`]; they are folded into the
/// [`crate::ErrorKind`] taxonomy there. They do surface from construction and
/// from the transport seam.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Reference cannot be reduced to `owner/repo`.
    #[error("invalid reference: {reference} - {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Request exceeded its timeout.
    #[error("request timed out: {message}")]
    Timeout { message: String },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl VerifyError {
    /// Whether the error means the remote host could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network { .. })
    }
}

impl From<reqwest::Error> for VerifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Result type for verifier operations.
pub type VerifyResult<T> = Result<T, VerifyError>;
