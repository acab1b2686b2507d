//! Rule scanner.
//!
//! Walks definitions in order (definition → rule → job → step) and dispatches
//! each rule by category. Policy problems (an unsafe pattern, a bad glob)
//! become violations located at the policy source; the scan itself never
//! fails.

mod checks;

use std::collections::HashMap;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use pipeguard_verify::{ReferenceVerifier, VerificationResult};
use tracing::{debug, warn};

use crate::model::PipelineDefinition;
use crate::pattern::{CompiledPattern, PatternCompiler, PatternError};
use crate::policy::{Policy, Rule, RuleCheck};
use crate::violation::{Location, Violation};

const POLICY_LOCATION: &str = "<policy>";

/// Scans definitions against one policy.
///
/// Patterns and globs are compiled once per scanner; pinned references are
/// verified once per distinct `reference@id`.
pub struct Scanner<'a> {
    policy: &'a Policy,
    compiler: PatternCompiler,
    verifier: &'a dyn ReferenceVerifier,
    prepared: bool,
    patterns: HashMap<String, Result<CompiledPattern, PatternError>>,
    globs: HashMap<(String, &'static str), GlobSet>,
    verified: HashMap<String, VerificationResult>,
}

impl<'a> Scanner<'a> {
    pub fn new(
        policy: &'a Policy,
        compiler: PatternCompiler,
        verifier: &'a dyn ReferenceVerifier,
    ) -> Self {
        Self {
            policy,
            compiler,
            verifier,
            prepared: false,
            patterns: HashMap::new(),
            globs: HashMap::new(),
            verified: HashMap::new(),
        }
    }

    /// Scan workflow definitions.
    pub async fn scan_pipelines(&mut self, definitions: &[PipelineDefinition]) -> Vec<Violation> {
        self.scan(definitions).await
    }

    /// Scan step bundles. Permission declarations are not required of bundles.
    pub async fn scan_step_bundles(&mut self, bundles: &[PipelineDefinition]) -> Vec<Violation> {
        self.scan(bundles).await
    }

    async fn scan(&mut self, definitions: &[PipelineDefinition]) -> Vec<Violation> {
        let mut out = Vec::new();
        if !self.prepared {
            self.prepare(&mut out);
            self.prepared = true;
        }

        let policy = self.policy;
        for def in definitions {
            debug!(path = %def.path, jobs = def.jobs.len(), "scanning definition");
            for rule in &policy.rules {
                self.apply(rule, def, &mut out).await;
            }
        }
        out
    }

    async fn apply(&mut self, rule: &Rule, def: &PipelineDefinition, out: &mut Vec<Violation>) {
        match &rule.check {
            RuleCheck::Permissions {
                top_level,
                job_level,
                hardening_step,
            } => checks::permissions(
                rule,
                def,
                *top_level,
                *job_level,
                hardening_step.as_deref(),
                out,
            ),
            RuleCheck::ShaPinning { verify } => self.sha_pinning(rule, def, *verify, out).await,
            RuleCheck::Allowlist { .. } => {
                checks::allowlist(rule, def, self.glob_set(rule, "allowed"), out)
            }
            RuleCheck::UnsafePattern { patterns } => {
                checks::unsafe_pattern(rule, def, patterns, &self.patterns, out)
            }
            RuleCheck::InlineScript {
                max_lines,
                patterns,
            } => checks::inline_script(rule, def, *max_lines, patterns, &self.patterns, out),
            RuleCheck::HighRiskTrigger {
                triggers,
                safeguards,
                ..
            } => checks::high_risk_trigger(
                rule,
                def,
                triggers,
                safeguards,
                self.glob_set(rule, "allowed"),
                out,
            ),
            RuleCheck::ArtifactPolicy {
                required_paths,
                artifact_actions,
                ..
            } => checks::artifact_policy(
                rule,
                def,
                required_paths,
                artifact_actions,
                self.glob_set(rule, "applies_to"),
                out,
            ),
            RuleCheck::DockerPinning => checks::docker_pinning(rule, def, out),
        }
    }

    /// Verify a pinned reference once per scan.
    async fn verify_once(&mut self, reference: &str, sha: &str) -> VerificationResult {
        let key = format!("{}@{}", reference, sha.to_ascii_lowercase());
        if let Some(result) = self.verified.get(&key) {
            return *result;
        }
        let result = self.verifier.verify(reference, sha).await;
        debug!(reference = %reference, ok = result.ok, code = result.code(), "verified reference");
        self.verified.insert(key, result);
        result
    }

    fn glob_set(&self, rule: &Rule, field: &'static str) -> Option<&GlobSet> {
        self.globs.get(&(rule.id.clone(), field))
    }

    /// Compile every pattern and glob of the policy, reporting the bad ones.
    fn prepare(&mut self, out: &mut Vec<Violation>) {
        let policy = self.policy;
        let source = if policy.source.is_empty() {
            POLICY_LOCATION
        } else {
            policy.source.as_str()
        };

        for rule in &policy.rules {
            match &rule.check {
                RuleCheck::UnsafePattern { patterns } | RuleCheck::InlineScript { patterns, .. } => {
                    for spec in patterns {
                        let allows = spec.allow.iter().map(|a| checks::whole_match(&a.pattern));
                        for pattern in std::iter::once(spec.pattern.clone()).chain(allows) {
                            if let Err(e) = self.compile(&pattern) {
                                warn!(rule = %rule.id, pattern = %pattern, error = %e, "rejected policy pattern");
                                out.push(checks::violation(
                                    rule,
                                    e.code(),
                                    format!("pattern '{}' rejected: {}", spec.id, e),
                                    Location::file(source),
                                ));
                            }
                        }
                    }
                }
                RuleCheck::Allowlist { allowed } => {
                    self.build_globs(rule, "allowed", allowed, source, out);
                }
                RuleCheck::HighRiskTrigger { allowed, .. } => {
                    self.build_globs(rule, "allowed", allowed, source, out);
                }
                RuleCheck::ArtifactPolicy { applies_to, .. } => {
                    if !applies_to.is_empty() {
                        self.build_globs(rule, "applies_to", applies_to, source, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn compile(&mut self, pattern: &str) -> Result<&CompiledPattern, &PatternError> {
        let compiler = &self.compiler;
        self.patterns
            .entry(pattern.to_string())
            .or_insert_with(|| compiler.compile(pattern))
            .as_ref()
    }

    fn build_globs(
        &mut self,
        rule: &Rule,
        field: &'static str,
        entries: &[String],
        source: &str,
        out: &mut Vec<Violation>,
    ) {
        let mut builder = GlobSetBuilder::new();
        for entry in entries {
            match GlobBuilder::new(entry)
                .literal_separator(true)
                .case_insensitive(true)
                .build()
            {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => {
                    warn!(rule = %rule.id, entry = %entry, error = %e, "rejected glob");
                    out.push(checks::violation(
                        rule,
                        "invalid_allowlist_entry",
                        format!("{} entry '{}' is not a valid glob: {}", field, entry, e),
                        Location::file(source),
                    ));
                }
            }
        }

        match builder.build() {
            Ok(set) => {
                self.globs.insert((rule.id.clone(), field), set);
            }
            Err(e) => {
                out.push(checks::violation(
                    rule,
                    "invalid_allowlist_entry",
                    format!("{} could not be built: {}", field, e),
                    Location::file(source),
                ));
            }
        }
    }
}

/// Scan workflow definitions with the default pattern compiler.
pub async fn scan_pipelines(
    definitions: &[PipelineDefinition],
    policy: &Policy,
    verifier: &dyn ReferenceVerifier,
) -> Vec<Violation> {
    Scanner::new(policy, PatternCompiler::default(), verifier)
        .scan_pipelines(definitions)
        .await
}

/// Scan step bundles with the default pattern compiler.
pub async fn scan_step_bundles(
    bundles: &[PipelineDefinition],
    policy: &Policy,
    verifier: &dyn ReferenceVerifier,
) -> Vec<Violation> {
    Scanner::new(policy, PatternCompiler::default(), verifier)
        .scan_step_bundles(bundles)
        .await
}
