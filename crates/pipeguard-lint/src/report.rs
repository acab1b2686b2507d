//! Violation reporter: applies documented exceptions and decides the exit
//! status. This is the only place that filters violations.

use std::path::{Path, PathBuf};

use pipeguard_verify::ExecutionMode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LintError, LintResult};
use crate::violation::{Category, Severity, Violation};

/// Report schema version for `--report` output.
pub const REPORT_SCHEMA_VERSION: &str = "1.1.0";

/// Repository-local exception file locations, relative to the scanned root.
pub const EXCEPTION_FILE_CANDIDATES: &[&str] = &[
    ".github/pipeguard-exceptions.yml",
    ".github/pipeguard-exceptions.yaml",
];

/// A documented exception scoped to a category and a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Exception {
    pub category: Category,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    /// Narrow to one rule id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub rationale: String,
}

impl Exception {
    pub fn matches(&self, violation: &Violation) -> bool {
        self.category == violation.category
            && self.path == violation.location.path
            && self
                .job
                .as_ref()
                .map_or(true, |job| violation.location.job.as_ref() == Some(job))
            && self
                .step
                .map_or(true, |step| violation.location.step == Some(step))
            && self
                .rule
                .as_ref()
                .map_or(true, |rule| *rule == violation.rule_id)
    }
}

/// Exceptions document: `exceptions: [...]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExceptionSet {
    #[serde(default)]
    pub exceptions: Vec<Exception>,
}

impl ExceptionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse and validate. Every exception must carry a rationale.
    pub fn from_yaml_str(source: &str, origin: &str) -> LintResult<Self> {
        let set: ExceptionSet =
            serde_yaml::from_str(source).map_err(|e| LintError::config(origin, e))?;

        for (index, exception) in set.exceptions.iter().enumerate() {
            if exception.rationale.trim().is_empty() {
                return Err(LintError::config(
                    origin,
                    format!("exception {} has no rationale", index),
                ));
            }
            if exception.path.trim().is_empty() {
                return Err(LintError::config(
                    origin,
                    format!("exception {} has no path", index),
                ));
            }
        }
        Ok(set)
    }

    pub fn load(path: &Path) -> LintResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| LintError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&source, &path.display().to_string())
    }

    /// First exception covering `violation`.
    pub fn find(&self, violation: &Violation) -> Option<&Exception> {
        self.exceptions.iter().find(|e| e.matches(violation))
    }

    pub fn len(&self) -> usize {
        self.exceptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
    }
}

/// Resolve exceptions for a scan of `root`: explicit path, then the
/// repository file, else none.
pub fn resolve_exceptions(root: &Path, explicit: Option<&Path>) -> LintResult<ExceptionSet> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => EXCEPTION_FILE_CANDIDATES
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|path| path.is_file()),
    };

    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading exceptions");
            ExceptionSet::load(&path)
        }
        None => Ok(ExceptionSet::empty()),
    }
}

/// A violation waived by an exception.
#[derive(Debug, Clone, Serialize)]
pub struct ExemptedViolation {
    #[serde(flatten)]
    pub violation: Violation,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub exempted: usize,
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub exit_ok: bool,
    pub mode: ExecutionMode,
    /// Enforced violations not covered by an exception.
    pub remaining: Vec<Violation>,
    /// Advisory violations not covered by an exception. Never blocking.
    pub advisories: Vec<Violation>,
    pub exempted: Vec<ExemptedViolation>,
}

impl Decision {
    /// Process exit code: 0 pass, 1 violations remain.
    pub fn exit_code(&self) -> i32 {
        if self.exit_ok {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            total: self.remaining.len() + self.advisories.len() + self.exempted.len(),
            errors: self.remaining.len(),
            warnings: self.advisories.len(),
            exempted: self.exempted.len(),
        }
    }
}

/// Apply exceptions and decide the run outcome. Input order is preserved in
/// every output list.
pub fn decide(violations: Vec<Violation>, exceptions: &ExceptionSet, mode: ExecutionMode) -> Decision {
    let mut remaining = Vec::new();
    let mut advisories = Vec::new();
    let mut exempted = Vec::new();

    for violation in violations {
        if let Some(exception) = exceptions.find(&violation) {
            debug!(
                code = %violation.code,
                location = %violation.location,
                "violation exempted"
            );
            exempted.push(ExemptedViolation {
                rationale: exception.rationale.clone(),
                violation,
            });
            continue;
        }

        match violation.severity {
            Severity::Error => remaining.push(violation),
            Severity::Warning => advisories.push(violation),
        }
    }

    Decision {
        exit_ok: remaining.is_empty(),
        mode,
        remaining,
        advisories,
        exempted,
    }
}

/// Machine-readable run report.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub schema_version: String,
    pub tool_version: String,
    pub mode: ExecutionMode,
    pub exit_ok: bool,
    pub exit_code: i32,
    pub definitions: usize,
    pub summary: Summary,
    pub remaining: Vec<Violation>,
    pub advisories: Vec<Violation>,
    pub exempted: Vec<ExemptedViolation>,
}

impl ScanReport {
    pub fn new(decision: &Decision, definitions: usize) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: decision.mode,
            exit_ok: decision.exit_ok,
            exit_code: decision.exit_code(),
            definitions,
            summary: decision.summary(),
            remaining: decision.remaining.clone(),
            advisories: decision.advisories.clone(),
            exempted: decision.exempted.clone(),
        }
    }

    /// Deterministic JSON: sorted keys, two-space indent, trailing newline.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let value = sort_keys(serde_json::to_value(self)?);
        let mut out = serde_json::to_string_pretty(&value)?;
        out.push('\n');
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> LintResult<()> {
        let json = self
            .to_json()
            .map_err(|e| LintError::config(path.display().to_string(), e))?;
        std::fs::write(path, json).map_err(|source| LintError::Io {
            path: PathBuf::from(path),
            source,
        })
    }
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::Location;

    fn error(category: Category, code: &str, location: Location) -> Violation {
        Violation::new("rule", category, code, Severity::Error, "m", location)
    }

    #[test]
    fn test_no_violations_passes() {
        let decision = decide(vec![], &ExceptionSet::empty(), ExecutionMode::Strict);
        assert!(decision.exit_ok);
        assert_eq!(decision.exit_code(), 0);
        assert_eq!(decision.mode, ExecutionMode::Strict);
    }

    #[test]
    fn test_remaining_violation_fails() {
        let v = error(Category::ShaPinning, "ref_not_pinned", Location::step("a.yml", "b", 0));
        let decision = decide(vec![v], &ExceptionSet::empty(), ExecutionMode::Tolerant);
        assert!(!decision.exit_ok);
        assert_eq!(decision.exit_code(), 1);
        assert_eq!(decision.remaining.len(), 1);
    }

    #[test]
    fn test_advisories_do_not_fail() {
        let v = Violation::new(
            "style",
            Category::InlineScript,
            "inline_script_too_long",
            Severity::Warning,
            "m",
            Location::step("a.yml", "b", 0),
        );
        let decision = decide(vec![v], &ExceptionSet::empty(), ExecutionMode::Strict);
        assert!(decision.exit_ok);
        assert_eq!(decision.advisories.len(), 1);
        assert_eq!(decision.summary().warnings, 1);
    }

    #[test]
    fn test_exception_scoped_to_location() {
        let exceptions = ExceptionSet::from_yaml_str(
            r#"
exceptions:
  - category: sha_pinning
    path: a.yml
    job: build
    rationale: vendored action reviewed in SEC-12
"#,
            "exceptions.yml",
        )
        .unwrap();

        let covered = error(Category::ShaPinning, "ref_not_pinned", Location::step("a.yml", "build", 2));
        let other_job = error(Category::ShaPinning, "ref_not_pinned", Location::step("a.yml", "test", 0));
        let other_category = error(Category::Allowlist, "action_not_allowlisted", Location::step("a.yml", "build", 2));

        let decision = decide(
            vec![covered, other_job, other_category],
            &exceptions,
            ExecutionMode::Strict,
        );
        assert_eq!(decision.exempted.len(), 1);
        assert_eq!(decision.exempted[0].rationale, "vendored action reviewed in SEC-12");
        assert_eq!(decision.remaining.len(), 2);
        assert!(!decision.exit_ok);
    }

    #[test]
    fn test_exception_rule_and_step_filters() {
        let exception = Exception {
            category: Category::Permissions,
            path: "a.yml".into(),
            job: None,
            step: Some(0),
            rule: Some("perms".into()),
            rationale: "r".into(),
        };
        let mut v = Violation::new(
            "perms",
            Category::Permissions,
            "hardening_step_not_first",
            Severity::Error,
            "m",
            Location::step("a.yml", "build", 0),
        );
        assert!(exception.matches(&v));
        v.rule_id = "other".into();
        assert!(!exception.matches(&v));
    }

    #[test]
    fn test_exception_without_rationale_rejected() {
        let err = ExceptionSet::from_yaml_str(
            "exceptions:\n  - category: permissions\n    path: a.yml\n    rationale: ''\n",
            "exceptions.yml",
        )
        .unwrap_err();
        assert!(matches!(err, LintError::Config { .. }));

        let missing_field = ExceptionSet::from_yaml_str(
            "exceptions:\n  - category: permissions\n    path: a.yml\n",
            "exceptions.yml",
        );
        assert!(missing_field.is_err());
    }

    #[test]
    fn test_report_json_is_deterministic() {
        let v = error(Category::Permissions, "missing_top_level_permissions", Location::file("a.yml"));
        let decision = decide(vec![v], &ExceptionSet::empty(), ExecutionMode::Strict);
        let report = ScanReport::new(&decision, 1);

        let json = report.to_json().unwrap();
        assert!(json.ends_with("}\n"));
        assert_eq!(json, report.to_json().unwrap());

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["schema_version"], "1.1.0");
        assert_eq!(parsed["mode"], "strict");
        assert_eq!(parsed["exit_code"], 1);
        assert_eq!(parsed["summary"]["errors"], 1);
        assert_eq!(parsed["remaining"][0]["code"], "missing_top_level_permissions");

        // Top-level keys appear in sorted order.
        let advisories = json.find("\"advisories\"").unwrap();
        let schema = json.find("\"schema_version\"").unwrap();
        assert!(advisories < schema);
    }

    #[test]
    fn test_resolve_exceptions_from_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_exceptions(dir.path(), None).unwrap().is_empty());

        std::fs::create_dir_all(dir.path().join(".github")).unwrap();
        std::fs::write(
            dir.path().join(".github/pipeguard-exceptions.yml"),
            "exceptions:\n  - category: docker_pinning\n    path: a.yml\n    rationale: internal registry\n",
        )
        .unwrap();
        assert_eq!(resolve_exceptions(dir.path(), None).unwrap().len(), 1);
    }
}
