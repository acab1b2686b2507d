//! Per-category checks. Each takes the rule and one definition and appends
//! violations in job, step order.

use std::collections::HashMap;

use globset::GlobSet;
use pipeguard_verify::{ImageRef, StepRef};

use super::Scanner;
use crate::model::{Job, PipelineDefinition, Step};
use crate::pattern::{CompiledPattern, PatternError};
use crate::policy::{PatternSpec, Rule};
use crate::violation::{Location, Violation};

type PatternCache = HashMap<String, Result<CompiledPattern, PatternError>>;

pub(super) fn violation(rule: &Rule, code: &str, message: String, location: Location) -> Violation {
    Violation::new(&rule.id, rule.category(), code, rule.severity(), message, location)
}

/// Every `uses:` in a definition, with its location, in document order.
fn references(def: &PipelineDefinition) -> Vec<(Location, &str)> {
    let mut refs = Vec::new();
    for job in &def.jobs {
        if let Some(uses) = job.uses.as_deref() {
            refs.push((Location::job(&def.path, &job.id), uses));
        }
        for step in &job.steps {
            if let Some(uses) = step.uses.as_deref() {
                refs.push((Location::step(&def.path, &job.id, step.index), uses));
            }
        }
    }
    refs
}

fn steps(def: &PipelineDefinition) -> impl Iterator<Item = (&Job, &Step)> {
    def.jobs
        .iter()
        .flat_map(|job| job.steps.iter().map(move |step| (job, step)))
}

pub(super) fn permissions(
    rule: &Rule,
    def: &PipelineDefinition,
    top_level: bool,
    job_level: bool,
    hardening_step: Option<&str>,
    out: &mut Vec<Violation>,
) {
    if !def.is_bundle() {
        if top_level && def.permissions.is_none() {
            out.push(violation(
                rule,
                "missing_top_level_permissions",
                "workflow does not declare top-level permissions".to_string(),
                Location::file(&def.path),
            ));
        }

        if job_level {
            for job in def.jobs.iter().filter(|j| j.permissions.is_none()) {
                out.push(violation(
                    rule,
                    "missing_job_permissions",
                    format!("job '{}' does not declare permissions", job.id),
                    Location::job(&def.path, &job.id),
                ));
            }
        }
    }

    let Some(required) = hardening_step else {
        return;
    };
    for job in &def.jobs {
        let Some(first) = job.steps.first() else {
            continue;
        };
        let is_hardening = first
            .uses
            .as_deref()
            .and_then(|uses| StepRef::parse(uses).ok())
            .and_then(|r| r.as_remote().map(|remote| remote.slug()))
            .is_some_and(|slug| slug.eq_ignore_ascii_case(required));

        if !is_hardening {
            out.push(violation(
                rule,
                "hardening_step_not_first",
                format!("first step of job '{}' is not {}", job.id, required),
                Location::step(&def.path, &job.id, first.index),
            ));
        }
    }
}

impl Scanner<'_> {
    pub(super) async fn sha_pinning(
        &mut self,
        rule: &Rule,
        def: &PipelineDefinition,
        verify: bool,
        out: &mut Vec<Violation>,
    ) {
        for (location, uses) in references(def) {
            let parsed = match StepRef::parse(uses) {
                Ok(parsed) => parsed,
                Err(e) => {
                    out.push(violation(rule, "invalid_reference", e.to_string(), location));
                    continue;
                }
            };

            match parsed {
                StepRef::Local(_) => {}
                StepRef::Docker(image) => {
                    if !image.is_digest_pinned() {
                        out.push(violation(
                            rule,
                            "image_not_pinned",
                            format!("image '{}' is not pinned by sha256 digest", image),
                            location,
                        ));
                    }
                }
                StepRef::Remote(remote) => {
                    if !remote.is_sha_pinned() {
                        out.push(violation(
                            rule,
                            "ref_not_pinned",
                            format!("'{}' is not pinned to a full commit SHA", remote),
                            location,
                        ));
                        continue;
                    }
                    if !verify {
                        continue;
                    }

                    let result = self.verify_once(&remote.path(), &remote.git_ref).await;
                    if let (false, Some(kind)) = (result.ok, result.error) {
                        out.push(violation(
                            rule,
                            kind.as_str(),
                            format!("'{}' failed verification: {}", remote, kind),
                            location,
                        ));
                    }
                }
            }
        }
    }
}

pub(super) fn allowlist(
    rule: &Rule,
    def: &PipelineDefinition,
    allowed: Option<&GlobSet>,
    out: &mut Vec<Violation>,
) {
    for (location, uses) in references(def) {
        let Ok(StepRef::Remote(remote)) = StepRef::parse(uses) else {
            continue;
        };
        let slug = remote.slug();
        if !allowed.is_some_and(|set| set.is_match(&slug)) {
            out.push(violation(
                rule,
                "action_not_allowlisted",
                format!("'{}' is not in the allow-list", slug),
                location,
            ));
        }
    }
}

pub(super) fn unsafe_pattern(
    rule: &Rule,
    def: &PipelineDefinition,
    patterns: &[PatternSpec],
    cache: &PatternCache,
    out: &mut Vec<Violation>,
) {
    for (job, step) in steps(def) {
        // `raw` carries the run body under its own key.
        for (field, value) in &step.raw {
            for spec in patterns {
                if let Some(hit) = first_uncovered(spec, cache, value) {
                    out.push(violation(
                        rule,
                        "unsafe_pattern_match",
                        describe(spec, field, hit),
                        Location::step(&def.path, &job.id, step.index),
                    ));
                }
            }
        }
    }
}

pub(super) fn inline_script(
    rule: &Rule,
    def: &PipelineDefinition,
    max_lines: Option<usize>,
    patterns: &[PatternSpec],
    cache: &PatternCache,
    out: &mut Vec<Violation>,
) {
    for (job, step) in steps(def) {
        let Some(script) = step.run.as_deref() else {
            continue;
        };
        let location = || Location::step(&def.path, &job.id, step.index);

        if let Some(max) = max_lines {
            let lines = script.lines().filter(|l| !l.trim().is_empty()).count();
            if lines > max {
                out.push(violation(
                    rule,
                    "inline_script_too_long",
                    format!("inline script has {} lines (max {})", lines, max),
                    location(),
                ));
            }
        }

        for spec in patterns {
            if let Some(hit) = first_uncovered(spec, cache, script) {
                out.push(violation(
                    rule,
                    "inline_script_pattern_match",
                    describe(spec, "run", hit),
                    location(),
                ));
            }
        }
    }
}

/// Allow entries cover a hit only when they match all of it.
pub(super) fn whole_match(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

/// First match of `spec` in `text` not covered by one of its allow entries.
/// Patterns that failed to compile match nothing.
fn first_uncovered<'t>(spec: &PatternSpec, cache: &PatternCache, text: &'t str) -> Option<&'t str> {
    let Some(Ok(pattern)) = cache.get(&spec.pattern) else {
        return None;
    };

    let allows: Vec<&CompiledPattern> = spec
        .allow
        .iter()
        .filter_map(|a| cache.get(&whole_match(&a.pattern)).and_then(|r| r.as_ref().ok()))
        .collect();

    pattern
        .find_all(text)
        .into_iter()
        .find(|hit| !allows.iter().any(|allow| allow.is_match(hit)))
}

fn describe(spec: &PatternSpec, field: &str, hit: &str) -> String {
    let message = spec.message.as_deref().unwrap_or("forbidden pattern");
    format!("{} ({}) in '{}': {}", message, spec.id, field, hit.trim())
}

pub(super) fn high_risk_trigger(
    rule: &Rule,
    def: &PipelineDefinition,
    triggers: &[String],
    safeguards: &[String],
    allowed: Option<&GlobSet>,
    out: &mut Vec<Violation>,
) {
    let risky: Vec<&str> = def
        .triggers
        .iter()
        .filter(|t| triggers.contains(*t))
        .map(String::as_str)
        .collect();
    if risky.is_empty() {
        return;
    }
    if allowed.is_some_and(|set| set.is_match(&def.path)) {
        return;
    }

    for job in &def.jobs {
        let guarded = safeguards.iter().any(|key| job.has_key(key));
        if !guarded {
            out.push(violation(
                rule,
                "high_risk_trigger_unguarded",
                format!(
                    "job '{}' runs on {} without a safeguard",
                    job.id,
                    risky.join(", ")
                ),
                Location::job(&def.path, &job.id),
            ));
        }
    }
}

pub(super) fn artifact_policy(
    rule: &Rule,
    def: &PipelineDefinition,
    required_paths: &[String],
    artifact_actions: &[String],
    applies_to: Option<&GlobSet>,
    out: &mut Vec<Violation>,
) {
    let producers: Vec<&Step> = steps(def)
        .map(|(_, step)| step)
        .filter(|step| is_artifact_step(step, artifact_actions))
        .collect();

    let applies = match applies_to {
        Some(set) => set.is_match(&def.path),
        None => !producers.is_empty(),
    };
    if !applies {
        return;
    }

    let uploaded: Vec<&str> = producers
        .iter()
        .filter_map(|step| step.raw_value("with.path"))
        .flat_map(str::lines)
        .map(normalize_artifact_path)
        .filter(|p| !p.is_empty())
        .collect();

    for required in required_paths {
        if !uploaded.contains(&normalize_artifact_path(required)) {
            out.push(violation(
                rule,
                "artifact_path_missing",
                format!("required artifact path '{}' is never uploaded", required),
                Location::file(&def.path),
            ));
        }
    }
}

fn is_artifact_step(step: &Step, artifact_actions: &[String]) -> bool {
    let Some(Ok(StepRef::Remote(remote))) = step.uses.as_deref().map(StepRef::parse) else {
        return false;
    };
    let path = remote.path();
    artifact_actions
        .iter()
        .any(|action| action.eq_ignore_ascii_case(&path))
}

fn normalize_artifact_path(path: &str) -> &str {
    let path = path.trim();
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_end_matches('/')
}

pub(super) fn docker_pinning(rule: &Rule, def: &PipelineDefinition, out: &mut Vec<Violation>) {
    for job in &def.jobs {
        let images = job
            .container_image
            .iter()
            .map(|image| ("container".to_string(), image))
            .chain(
                job.service_images
                    .iter()
                    .map(|(name, image)| (format!("service '{}'", name), image)),
            );

        for (role, image) in images {
            // Expression-valued images are resolved at run time.
            if image.contains("${{") {
                continue;
            }
            let image = image.strip_prefix("docker://").unwrap_or(image);
            let pinned = ImageRef::parse(image).is_ok_and(|i| i.is_digest_pinned());
            if !pinned {
                out.push(violation(
                    rule,
                    "image_not_pinned",
                    format!("{} image '{}' is not pinned by sha256 digest", role, image),
                    Location::job(&def.path, &job.id),
                ));
            }
        }
    }
}
