use std::sync::Arc;

use anyhow::{Context, Result};
use pipeguard_verify::{ExecutionMode, HttpTransport, RefVerifier, RunContext, VerifyConfig};
use tracing::debug;

use super::args::VerifyOptions;

/// Resolve the verifier configuration: environment first, then flags.
pub fn verify_config(opts: &VerifyOptions) -> VerifyConfig {
    let mut config = VerifyConfig::from_env();
    if let Some(url) = &opts.api_url {
        config = config.with_url(url.clone());
    }
    if let Some(secs) = opts.timeout {
        config = config.with_timeout_secs(secs);
    }
    if opts.no_verify {
        config = config.with_enabled(false);
    }
    config
}

/// Resolve the execution mode once per run.
pub fn execution_mode(opts: &VerifyOptions) -> ExecutionMode {
    opts.mode
        .map(ExecutionMode::from)
        .unwrap_or_else(ExecutionMode::from_env)
}

/// Wire the production verifier with a fresh run context.
pub fn build_verifier(opts: &VerifyOptions) -> Result<RefVerifier> {
    let config = verify_config(opts);
    let mode = execution_mode(opts);
    debug!(
        api_url = %config.api_url,
        enabled = config.enabled,
        timeout_secs = config.timeout_secs,
        mode = %mode,
        "verifier configuration"
    );

    let transport = HttpTransport::new(&config).context("failed to build HTTP client")?;
    Ok(RefVerifier::new(config, Arc::new(transport), RunContext::new(mode)))
}
