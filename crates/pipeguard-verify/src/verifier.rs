//! Reference verifier: bypass ladder, reachability probe, cached lookups.
//!
//! Public API: no status code knowledge. All HTTP/status mapping lives in
//! `transport.rs`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::reference::{is_full_sha, is_local_reference, normalize_repo};
use crate::run::RunContext;
use crate::transport::{classify_status, Transport};
use crate::types::{ErrorKind, VerificationResult, VerifyConfig};

/// Callback seam used by the scanner.
#[async_trait]
pub trait ReferenceVerifier: Send + Sync {
    /// Verify that `claimed` resolves for `reference`. Never fails; every
    /// outcome is expressed through [`VerificationResult`].
    async fn verify(&self, reference: &str, claimed: &str) -> VerificationResult;
}

/// Verifier for remote action references.
pub struct RefVerifier {
    config: VerifyConfig,
    transport: Arc<dyn Transport>,
    ctx: Arc<RunContext>,
}

impl RefVerifier {
    pub fn new(config: VerifyConfig, transport: Arc<dyn Transport>, ctx: Arc<RunContext>) -> Self {
        Self {
            config,
            transport,
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    /// Verify a reference against its claimed commit SHA.
    ///
    /// Rungs, in order (each short-circuits):
    /// 1. local reference → `ok`, `local_action`
    /// 2. verification disabled → `ok`, `verification_disabled`
    /// 3. empty input → `ok`, `missing_action_or_ref`
    /// 4. not a full SHA → `ok`, `not_sha`
    /// 5. not reducible to `owner/repo` → `invalid_reference`
    /// 6. reachability probe (once per run)
    /// 7. cached commit lookup
    pub async fn verify(&self, reference: &str, claimed: &str) -> VerificationResult {
        let reference = reference.trim();
        let claimed = claimed.trim();

        if is_local_reference(reference) {
            return VerificationResult::bypass(ErrorKind::LocalAction);
        }

        if !self.config.enabled {
            return VerificationResult::bypass(ErrorKind::VerificationDisabled);
        }

        if reference.is_empty() || claimed.is_empty() {
            return VerificationResult::bypass(ErrorKind::MissingActionOrRef);
        }

        if !is_full_sha(claimed) {
            return VerificationResult::bypass(ErrorKind::NotSha);
        }

        let repo = match normalize_repo(reference) {
            Ok(repo) => repo,
            Err(e) => {
                warn!(reference = %reference, error = %e, "rejecting reference before lookup");
                return VerificationResult::failed(ErrorKind::InvalidReference);
            }
        };

        if !self.reachable().await {
            return self.unreachable();
        }

        let sha = claimed.to_ascii_lowercase();
        let cell = self.ctx.cache_cell((repo.clone(), sha.clone())).await;
        *cell.get_or_init(|| self.lookup(&repo, &sha)).await
    }

    /// Probe once per run; concurrent callers await the first probe.
    async fn reachable(&self) -> bool {
        *self
            .ctx
            .probe_cell()
            .get_or_init(|| async {
                match self.transport.probe().await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, mode = %self.ctx.mode(), "verification API unreachable");
                        false
                    }
                }
            })
            .await
    }

    async fn lookup(&self, repo: &str, sha: &str) -> VerificationResult {
        match self.transport.commit_status(repo, sha).await {
            Ok(status) => {
                let result = classify_status(status);
                debug!(repo = %repo, sha = %sha, status, code = result.code(), "commit lookup");
                result
            }
            Err(e) => {
                warn!(repo = %repo, sha = %sha, error = %e, "commit lookup failed");
                self.unreachable()
            }
        }
    }

    fn unreachable(&self) -> VerificationResult {
        if self.ctx.mode().is_strict() {
            VerificationResult::failed(ErrorKind::ApiUnreachable)
        } else {
            VerificationResult::bypass(ErrorKind::ApiUnreachableLocalSkip)
        }
    }
}

#[async_trait]
impl ReferenceVerifier for RefVerifier {
    async fn verify(&self, reference: &str, claimed: &str) -> VerificationResult {
        RefVerifier::verify(self, reference, claimed).await
    }
}
