//! Result, taxonomy and configuration types.

use serde::{Deserialize, Serialize};

/// Length of a full commit SHA (hex digits).
pub const COMMIT_SHA_LEN: usize = 40;

/// Execution context of a run.
///
/// Strict runs (CI, unattended) fail closed on infrastructure faults; tolerant
/// runs (a developer's machine) degrade to a skip instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Strict,
    Tolerant,
}

impl ExecutionMode {
    /// Resolve the mode from the process environment.
    ///
    /// `PIPEGUARD_MODE` wins when set to `strict` or `tolerant`. Otherwise
    /// `CI=true` or `GITHUB_ACTIONS=true` selects strict mode.
    pub fn from_env() -> Self {
        if let Some(mode) = std::env::var("PIPEGUARD_MODE")
            .ok()
            .and_then(|v| Self::parse(&v))
        {
            return mode;
        }

        let automated = ["CI", "GITHUB_ACTIONS"].iter().any(|name| {
            std::env::var(name)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        });

        if automated {
            Self::Strict
        } else {
            Self::Tolerant
        }
    }

    /// Parse `strict` / `tolerant` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "tolerant" => Some(Self::Tolerant),
            _ => None,
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Tolerant => write!(f, "tolerant"),
        }
    }
}

/// Verification outcome codes.
///
/// The string forms are part of the public contract: downstream tooling greps
/// for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    LocalAction,
    VerificationDisabled,
    MissingActionOrRef,
    NotSha,
    InvalidReference,
    ApiUnreachable,
    ApiUnreachableLocalSkip,
    RefNotFound,
    Unauthorized,
    ForbiddenOrRateLimited,
    RateLimited,
    UnexpectedStatus,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalAction => "local_action",
            Self::VerificationDisabled => "verification_disabled",
            Self::MissingActionOrRef => "missing_action_or_ref",
            Self::NotSha => "not_sha",
            Self::InvalidReference => "invalid_reference",
            Self::ApiUnreachable => "api_unreachable",
            Self::ApiUnreachableLocalSkip => "api_unreachable_local_skip",
            Self::RefNotFound => "ref_not_found",
            Self::Unauthorized => "unauthorized",
            Self::ForbiddenOrRateLimited => "forbidden_or_rate_limited",
            Self::RateLimited => "rate_limited",
            Self::UnexpectedStatus => "unexpected_status",
        }
    }

    /// Whether the code reports a verification infrastructure problem rather
    /// than a verdict about the reference itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::ApiUnreachable
                | Self::ApiUnreachableLocalSkip
                | Self::Unauthorized
                | Self::ForbiddenOrRateLimited
                | Self::RateLimited
                | Self::UnexpectedStatus
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of verifying one `(reference, claimed SHA)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub ok: bool,
    pub error: Option<ErrorKind>,
}

impl VerificationResult {
    /// The SHA resolved in the remote repository.
    pub fn verified() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    /// Verification was skipped; not a failure.
    pub fn bypass(kind: ErrorKind) -> Self {
        Self {
            ok: true,
            error: Some(kind),
        }
    }

    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            ok: false,
            error: Some(kind),
        }
    }

    /// Stable code for logs and reports (`ok` when there is no error kind).
    pub fn code(&self) -> &'static str {
        self.error.map(|k| k.as_str()).unwrap_or("ok")
    }
}

/// Verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token for lookups.
    #[serde(default)]
    pub token: Option<String>,

    /// Whether remote verification runs at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    10
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            enabled: default_enabled(),
            timeout_secs: default_timeout(),
        }
    }
}

impl VerifyConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PIPEGUARD_API_URL` | API base URL |
    /// | `PIPEGUARD_GITHUB_TOKEN`, `GITHUB_TOKEN`, `GH_TOKEN` | Token, first non-empty wins |
    /// | `PIPEGUARD_VERIFY_REFS` | `0`/`false` disables verification |
    /// | `PIPEGUARD_VERIFY_TIMEOUT` | Timeout in seconds |
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("PIPEGUARD_API_URL").unwrap_or_else(|_| default_api_url()),
            token: crate::auth::token_from_env(),
            enabled: std::env::var("PIPEGUARD_VERIFY_REFS")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or_else(|_| default_enabled()),
            timeout_secs: std::env::var("PIPEGUARD_VERIFY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
        }
    }

    /// Set the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the API base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Enable or disable verification.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_mode_env() {
        std::env::remove_var("PIPEGUARD_MODE");
        std::env::remove_var("CI");
        std::env::remove_var("GITHUB_ACTIONS");
    }

    #[test]
    #[serial]
    fn test_mode_defaults_to_tolerant_outside_ci() {
        clear_mode_env();
        assert_eq!(ExecutionMode::from_env(), ExecutionMode::Tolerant);
    }

    #[test]
    #[serial]
    fn test_mode_strict_under_ci() {
        clear_mode_env();
        std::env::set_var("GITHUB_ACTIONS", "true");
        assert_eq!(ExecutionMode::from_env(), ExecutionMode::Strict);
        clear_mode_env();
    }

    #[test]
    #[serial]
    fn test_mode_explicit_override_wins() {
        clear_mode_env();
        std::env::set_var("CI", "true");
        std::env::set_var("PIPEGUARD_MODE", "tolerant");
        assert_eq!(ExecutionMode::from_env(), ExecutionMode::Tolerant);
        clear_mode_env();
    }

    #[test]
    fn test_error_kind_codes_are_snake_case() {
        assert_eq!(ErrorKind::ForbiddenOrRateLimited.as_str(), "forbidden_or_rate_limited");
        assert_eq!(ErrorKind::ApiUnreachableLocalSkip.to_string(), "api_unreachable_local_skip");
        let json = serde_json::to_string(&ErrorKind::RefNotFound).unwrap();
        assert_eq!(json, "\"ref_not_found\"");
    }

    #[test]
    fn test_result_code() {
        assert_eq!(VerificationResult::verified().code(), "ok");
        assert_eq!(VerificationResult::bypass(ErrorKind::NotSha).code(), "not_sha");
        assert!(!VerificationResult::failed(ErrorKind::RateLimited).ok);
    }

    #[test]
    #[serial]
    fn test_config_from_env_disable() {
        std::env::set_var("PIPEGUARD_VERIFY_REFS", "false");
        std::env::set_var("PIPEGUARD_VERIFY_TIMEOUT", "3");
        let config = VerifyConfig::from_env();
        assert!(!config.enabled);
        assert_eq!(config.timeout_secs, 3);
        std::env::remove_var("PIPEGUARD_VERIFY_REFS");
        std::env::remove_var("PIPEGUARD_VERIFY_TIMEOUT");
    }
}
