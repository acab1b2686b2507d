//! Policy loading.
//!
//! Resolution order: explicit path, then `.github/pipeguard.yml` (or
//! `.yaml`) under the scanned root, then the built-in default policy.

pub mod schema;

use std::path::{Path, PathBuf};

use tracing::debug;

pub use schema::{
    Enforcement, PatternAllow, PatternSpec, Policy, PolicyValidationError, Rule, RuleCheck,
};

use crate::error::{LintError, LintResult};

/// Built-in policy YAML.
pub const DEFAULT_POLICY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/policies/default.yaml"
));

/// Repository-local policy locations, relative to the scanned root.
pub const POLICY_FILE_CANDIDATES: &[&str] = &[".github/pipeguard.yml", ".github/pipeguard.yaml"];

impl Policy {
    /// Parse and validate a policy document.
    pub fn from_yaml_str(source: &str, origin: &str) -> LintResult<Self> {
        let mut policy: Policy =
            serde_yaml::from_str(source).map_err(|e| LintError::config(origin, e))?;
        policy.validate().map_err(|e| LintError::config(origin, e))?;
        policy.source = origin.to_string();
        Ok(policy)
    }

    /// The built-in policy.
    pub fn builtin() -> LintResult<Self> {
        Self::from_yaml_str(DEFAULT_POLICY, "<builtin>")
    }

    pub fn load(path: &Path) -> LintResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| LintError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&source, &path.display().to_string())
    }
}

/// Resolve the policy for a scan of `root`.
pub fn resolve_policy(root: &Path, explicit: Option<&Path>) -> LintResult<Policy> {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "loading policy");
        return Policy::load(path);
    }

    if let Some(path) = find_policy_file(root) {
        debug!(path = %path.display(), "loading repository policy");
        return Policy::load(&path);
    }

    debug!("no policy file found, using built-in policy");
    Policy::builtin()
}

fn find_policy_file(root: &Path) -> Option<PathBuf> {
    POLICY_FILE_CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.is_file())
}
