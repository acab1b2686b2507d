//! Policy schema types.
//!
//! Rules are pure data: a category tag plus category-specific parameters.

use serde::{Deserialize, Serialize};

use crate::violation::{Category, Severity};

/// A policy document as loaded from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Where the policy was loaded from. Set by the loader.
    #[serde(skip)]
    pub source: String,
}

impl Policy {
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        let mut seen_ids = std::collections::HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                return Err(PolicyValidationError::EmptyRuleId);
            }
            if !seen_ids.insert(&rule.id) {
                return Err(PolicyValidationError::DuplicateRuleId {
                    rule_id: rule.id.clone(),
                });
            }
            rule.check.validate(&rule.id)?;
        }
        Ok(())
    }
}

/// Whether a rule fails the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    #[default]
    Enforced,
    /// Reported, never blocking.
    Advisory,
}

impl Enforcement {
    pub fn severity(&self) -> Severity {
        match self {
            Enforcement::Enforced => Severity::Error,
            Enforcement::Advisory => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub id: String,

    #[serde(default)]
    pub mode: Enforcement,

    #[serde(default)]
    pub description: Option<String>,

    pub check: RuleCheck,
}

impl Rule {
    pub fn category(&self) -> Category {
        self.check.category()
    }

    pub fn severity(&self) -> Severity {
        self.mode.severity()
    }
}

/// Category-specific parameters (tagged union keyed by `category`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleCheck {
    /// Top-level and job-level permission declarations, hardening step first.
    Permissions {
        #[serde(default = "enabled")]
        top_level: bool,
        #[serde(default = "enabled")]
        job_level: bool,
        /// `owner/repo` that must be referenced by step 0 of every job.
        #[serde(default)]
        hardening_step: Option<String>,
    },

    /// Remote references pinned to full commit SHAs, images to digests.
    ShaPinning {
        /// Resolve pinned references through the verifier.
        #[serde(default = "enabled")]
        verify: bool,
    },

    /// Remote references must match an allowed `owner/repo` glob.
    Allowlist { allowed: Vec<String> },

    /// Forbidden patterns over run bodies and raw step values.
    UnsafePattern { patterns: Vec<PatternSpec> },

    /// Inline script size and content.
    InlineScript {
        #[serde(default)]
        max_lines: Option<usize>,
        #[serde(default)]
        patterns: Vec<PatternSpec>,
    },

    /// Triggers that need an allow entry or safeguards.
    HighRiskTrigger {
        triggers: Vec<String>,
        /// Definition path globs exempt from the rule.
        #[serde(default)]
        allowed: Vec<String>,
        /// Job keys that count as a safeguard (`environment`, `if`, ...).
        #[serde(default)]
        safeguards: Vec<String>,
    },

    /// Required upload paths for artifact-producing steps.
    ArtifactPolicy {
        required_paths: Vec<String>,
        #[serde(default = "default_artifact_actions")]
        artifact_actions: Vec<String>,
        /// Definition path globs. Empty: any definition with an artifact step.
        #[serde(default)]
        applies_to: Vec<String>,
    },

    /// Job container and service images pinned by digest.
    DockerPinning,
}

impl RuleCheck {
    pub fn category(&self) -> Category {
        match self {
            RuleCheck::Permissions { .. } => Category::Permissions,
            RuleCheck::ShaPinning { .. } => Category::ShaPinning,
            RuleCheck::Allowlist { .. } => Category::Allowlist,
            RuleCheck::UnsafePattern { .. } => Category::UnsafePattern,
            RuleCheck::InlineScript { .. } => Category::InlineScript,
            RuleCheck::HighRiskTrigger { .. } => Category::HighRiskTrigger,
            RuleCheck::ArtifactPolicy { .. } => Category::ArtifactPolicy,
            RuleCheck::DockerPinning => Category::DockerPinning,
        }
    }

    /// Structural validation. Pattern and glob syntax is checked at scan time,
    /// where a bad entry becomes a violation instead of aborting the run.
    pub fn validate(&self, rule_id: &str) -> Result<(), PolicyValidationError> {
        let invalid = |reason: &str| PolicyValidationError::InvalidCheck {
            rule: rule_id.to_string(),
            reason: reason.to_string(),
        };

        match self {
            RuleCheck::Permissions { hardening_step, .. } => {
                if let Some(step) = hardening_step {
                    let mut parts = step.split('/');
                    let shape_ok = matches!(
                        (parts.next(), parts.next(), parts.next()),
                        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty()
                    );
                    if !shape_ok {
                        return Err(invalid("permissions.hardening_step must be 'owner/repo'"));
                    }
                }
            }
            RuleCheck::ShaPinning { .. } | RuleCheck::DockerPinning => {}
            RuleCheck::Allowlist { allowed } => {
                if allowed.iter().any(|a| a.trim().is_empty()) {
                    return Err(invalid("allowlist.allowed entries cannot be empty"));
                }
            }
            RuleCheck::UnsafePattern { patterns } => {
                if patterns.is_empty() {
                    return Err(invalid("unsafe_pattern.patterns cannot be empty"));
                }
                validate_patterns(rule_id, patterns)?;
            }
            RuleCheck::InlineScript {
                max_lines,
                patterns,
            } => {
                if max_lines.is_none() && patterns.is_empty() {
                    return Err(invalid("inline_script requires max_lines or patterns"));
                }
                if *max_lines == Some(0) {
                    return Err(invalid("inline_script.max_lines must be > 0"));
                }
                validate_patterns(rule_id, patterns)?;
            }
            RuleCheck::HighRiskTrigger { triggers, .. } => {
                if triggers.is_empty() {
                    return Err(invalid("high_risk_trigger.triggers cannot be empty"));
                }
            }
            RuleCheck::ArtifactPolicy {
                required_paths,
                artifact_actions,
                ..
            } => {
                if required_paths.is_empty() {
                    return Err(invalid("artifact_policy.required_paths cannot be empty"));
                }
                if artifact_actions.is_empty() {
                    return Err(invalid("artifact_policy.artifact_actions cannot be empty"));
                }
            }
        }
        Ok(())
    }
}

/// A forbidden pattern with its documented exceptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSpec {
    pub id: String,
    pub pattern: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Matches covered by one of these are not reported.
    #[serde(default)]
    pub allow: Vec<PatternAllow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternAllow {
    /// Regular expression that must match the whole matched text.
    pub pattern: String,
    pub rationale: String,
}

fn validate_patterns(rule_id: &str, patterns: &[PatternSpec]) -> Result<(), PolicyValidationError> {
    let mut seen = std::collections::HashSet::new();
    for spec in patterns {
        let invalid = |reason: String| PolicyValidationError::InvalidCheck {
            rule: rule_id.to_string(),
            reason,
        };
        if spec.id.trim().is_empty() {
            return Err(invalid("pattern id cannot be empty".to_string()));
        }
        if !seen.insert(&spec.id) {
            return Err(invalid(format!("duplicate pattern id '{}'", spec.id)));
        }
        if spec.pattern.is_empty() {
            return Err(invalid(format!("pattern '{}' is empty", spec.id)));
        }
        if spec.allow.iter().any(|a| a.rationale.trim().is_empty()) {
            return Err(invalid(format!(
                "allow entry of pattern '{}' has no rationale",
                spec.id
            )));
        }
    }
    Ok(())
}

fn enabled() -> bool {
    true
}

fn default_artifact_actions() -> Vec<String> {
    vec!["actions/upload-artifact".to_string()]
}

/// Policy validation error.
#[derive(Debug, thiserror::Error)]
pub enum PolicyValidationError {
    #[error("policy has a rule with an empty id")]
    EmptyRuleId,

    #[error("policy has duplicate rule id '{rule_id}'")]
    DuplicateRuleId { rule_id: String },

    #[error("rule '{rule}' has invalid check: {reason}")]
    InvalidCheck { rule: String, reason: String },
}
