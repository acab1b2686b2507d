//! HTTP layer: the transport seam and status mapping.
//!
//! This is the ONLY place for status code handling. `verifier.rs` never
//! interprets status codes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use tracing::debug;

use crate::auth::TokenProvider;
use crate::error::{VerifyError, VerifyResult};
use crate::types::{ErrorKind, VerificationResult, VerifyConfig};

pub const USER_AGENT_VALUE: &str = concat!("pipeguard/", env!("CARGO_PKG_VERSION"));

/// Network access used by the verifier.
///
/// Production wiring supplies [`HttpTransport`]; tests substitute
/// deterministic stand-ins. Both calls must be bounded by a timeout; an
/// implementation reports a timeout or connection failure as `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Lightweight reachability check. Any HTTP response counts as reachable.
    async fn probe(&self) -> VerifyResult<()>;

    /// Look up `sha` in `owner/repo`; returns the HTTP status code.
    async fn commit_status(&self, repo: &str, sha: &str) -> VerifyResult<u16>;
}

/// Map a commit lookup status to a verification result.
///
/// ```
/// use pipeguard_verify::{classify_status, ErrorKind};
///
/// assert!(classify_status(200).ok);
/// assert_eq!(classify_status(404).error, Some(ErrorKind::RefNotFound));
/// assert_eq!(classify_status(502).error, Some(ErrorKind::UnexpectedStatus));
/// ```
pub fn classify_status(status: u16) -> VerificationResult {
    match status {
        200 => VerificationResult::verified(),
        404 => VerificationResult::failed(ErrorKind::RefNotFound),
        401 => VerificationResult::failed(ErrorKind::Unauthorized),
        403 => VerificationResult::failed(ErrorKind::ForbiddenOrRateLimited),
        429 => VerificationResult::failed(ErrorKind::RateLimited),
        _ => VerificationResult::failed(ErrorKind::UnexpectedStatus),
    }
}

/// GitHub REST transport (holds reqwest client, auth, base URL).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token_provider: TokenProvider,
}

impl HttpTransport {
    pub fn new(config: &VerifyConfig) -> VerifyResult<Self> {
        let token_provider = config
            .token
            .as_ref()
            .map(TokenProvider::static_token)
            .unwrap_or_else(TokenProvider::from_env);

        Self::with_token_provider(config, token_provider)
    }

    pub fn with_token_provider(
        config: &VerifyConfig,
        token_provider: TokenProvider,
    ) -> VerifyResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| VerifyError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token_provider,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token_provider.is_authenticated()
    }

    async fn get(&self, url: &str) -> VerifyResult<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(token) = self.token_provider.get_token() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        Ok(request.send().await?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self) -> VerifyResult<()> {
        let url = format!("{}/rate_limit", self.base_url);
        debug!(url = %url, "probing API reachability");

        let response = self.get(&url).await?;
        debug!(status = response.status().as_u16(), "API reachable");
        Ok(())
    }

    async fn commit_status(&self, repo: &str, sha: &str) -> VerifyResult<u16> {
        let url = format!("{}/repos/{}/commits/{}", self.base_url, repo, sha);
        debug!(url = %url, "looking up commit");

        let response = self.get(&url).await?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_is_exact() {
        let cases = [
            (200, true, None),
            (404, false, Some(ErrorKind::RefNotFound)),
            (401, false, Some(ErrorKind::Unauthorized)),
            (403, false, Some(ErrorKind::ForbiddenOrRateLimited)),
            (429, false, Some(ErrorKind::RateLimited)),
        ];
        for (status, ok, error) in cases {
            let result = classify_status(status);
            assert_eq!(result.ok, ok, "status {}", status);
            assert_eq!(result.error, error, "status {}", status);
        }
    }

    #[test]
    fn test_status_mapping_is_total() {
        for status in [0u16, 100, 201, 204, 301, 304, 400, 402, 410, 418, 500, 502, 503, 999] {
            assert_eq!(
                classify_status(status),
                VerificationResult::failed(ErrorKind::UnexpectedStatus),
                "status {}",
                status
            );
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = VerifyConfig::default().with_url("http://127.0.0.1:9/api/");
        let transport = HttpTransport::with_token_provider(&config, TokenProvider::None).unwrap();
        assert_eq!(transport.base_url(), "http://127.0.0.1:9/api");
        assert!(!transport.is_authenticated());
    }
}
