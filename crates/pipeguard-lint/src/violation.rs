//! Violations: what a rule found, where, and how severe.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Violation severity. Enforced rules produce errors, advisory rules warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Rule category. The scanner dispatches on this, never on rule ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Permissions,
    ShaPinning,
    Allowlist,
    UnsafePattern,
    InlineScript,
    HighRiskTrigger,
    ArtifactPolicy,
    DockerPinning,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Permissions => "permissions",
            Category::ShaPinning => "sha_pinning",
            Category::Allowlist => "allowlist",
            Category::UnsafePattern => "unsafe_pattern",
            Category::InlineScript => "inline_script",
            Category::HighRiskTrigger => "high_risk_trigger",
            Category::ArtifactPolicy => "artifact_policy",
            Category::DockerPinning => "docker_pinning",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a violation was found. `step` is the zero-based step index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
}

impl Location {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            job: None,
            step: None,
        }
    }

    pub fn job(path: impl Into<String>, job: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            job: Some(job.into()),
            step: None,
        }
    }

    pub fn step(path: impl Into<String>, job: impl Into<String>, step: usize) -> Self {
        Self {
            path: path.into(),
            job: Some(job.into()),
            step: Some(step),
        }
    }

    fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.path,
            self.job.as_deref().unwrap_or("-"),
            self.step.map(|s| s.to_string()).unwrap_or_else(|| "-".into())
        )
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(job) = &self.job {
            write!(f, " [job {}", job)?;
            if let Some(step) = self.step {
                write!(f, ", step {}", step)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// A single policy violation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub category: Category,
    /// Stable, greppable code (`ref_not_pinned`, `rate_limited`, ...).
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub location: Location,
    pub fingerprint: String,
}

impl Violation {
    pub fn new(
        rule_id: impl Into<String>,
        category: Category,
        code: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        let rule_id = rule_id.into();
        let code = code.into();

        // Stable across runs: sha256(rule_id:code:location)
        let fingerprint = format!(
            "sha256:{}",
            hex::encode(Sha256::digest(
                format!("{}:{}:{}", rule_id, code, location.key()).as_bytes()
            ))
        );

        Self {
            rule_id,
            category,
            code,
            message: message.into(),
            severity,
            location,
            fingerprint,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
