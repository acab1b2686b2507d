//! Pipeline and step-bundle definitions.
//!
//! Documents are parsed through `serde_yaml::Value` so that mapping order
//! (jobs, steps, triggers) survives into the model and violations come out in
//! document order.

use serde_yaml::{Mapping, Value};

use crate::error::{LintError, LintResult};

/// What kind of document a definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    /// Workflow under `.github/workflows/`.
    Pipeline,
    /// Reusable step definition (`action.yml`).
    StepBundle,
}

/// Declared permission set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permissions {
    /// `read-all`, `write-all`.
    Blanket(String),
    /// Scope map. May be empty (`permissions: {}`), which still counts as declared.
    Scopes(Vec<(String, String)>),
}

/// One analyzed unit.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub path: String,
    pub kind: DefinitionKind,
    pub name: Option<String>,
    /// Event names in document order.
    pub triggers: Vec<String>,
    pub permissions: Option<Permissions>,
    pub jobs: Vec<Job>,
}

impl PipelineDefinition {
    pub fn is_bundle(&self) -> bool {
        self.kind == DefinitionKind::StepBundle
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub name: Option<String>,
    pub permissions: Option<Permissions>,
    /// Reusable workflow call.
    pub uses: Option<String>,
    pub container_image: Option<String>,
    /// `(service name, image)` in document order.
    pub service_images: Vec<(String, String)>,
    /// Every key declared on the job.
    pub keys: Vec<String>,
    pub steps: Vec<Step>,
}

impl Job {
    pub fn has_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Step {
    pub index: usize,
    pub name: Option<String>,
    pub uses: Option<String>,
    pub run: Option<String>,
    /// Flattened scalar fields: `if`, `shell`, `with.<k>`, `env.<k>`, ...
    pub raw: Vec<(String, String)>,
}

impl Step {
    pub fn raw_value(&self, key: &str) -> Option<&str> {
        self.raw
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a workflow document.
pub fn parse_pipeline(path: &str, source: &str) -> LintResult<PipelineDefinition> {
    let root = parse_root(path, source)?;

    let triggers = match get(&root, "on") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(event)) => vec![event.clone()],
        Some(Value::Sequence(events)) => events
            .iter()
            .map(|e| scalar(e).ok_or_else(|| LintError::parse(path, "trigger must be a string")))
            .collect::<LintResult<_>>()?,
        Some(Value::Mapping(events)) => events.keys().filter_map(scalar).collect(),
        Some(_) => return Err(LintError::parse(path, "'on' must be a string, list or mapping")),
    };

    let jobs = match get(&root, "jobs") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Mapping(jobs)) => jobs
            .iter()
            .map(|(id, job)| {
                let id = scalar(id).ok_or_else(|| LintError::parse(path, "job id must be a string"))?;
                parse_job(path, id, job)
            })
            .collect::<LintResult<_>>()?,
        Some(_) => return Err(LintError::parse(path, "'jobs' must be a mapping")),
    };

    Ok(PipelineDefinition {
        path: path.to_string(),
        kind: DefinitionKind::Pipeline,
        name: get(&root, "name").and_then(scalar),
        triggers,
        permissions: parse_permissions(path, get(&root, "permissions"))?,
        jobs,
    })
}

/// Parse a step bundle (`action.yml`).
///
/// Composite bundles become one job `runs` holding `runs.steps`; a bundle
/// running a `docker://` image becomes one job with a single step
/// referencing that image. Other bundle kinds carry no jobs.
pub fn parse_step_bundle(path: &str, source: &str) -> LintResult<PipelineDefinition> {
    let root = parse_root(path, source)?;

    let runs = match get(&root, "runs") {
        None | Some(Value::Null) => None,
        Some(Value::Mapping(runs)) => Some(runs),
        Some(_) => return Err(LintError::parse(path, "'runs' must be a mapping")),
    };

    let mut jobs = Vec::new();
    if let Some(runs) = runs {
        let keys = runs.keys().filter_map(scalar).collect();

        if let Some(steps) = get(runs, "steps") {
            jobs.push(Job {
                id: "runs".to_string(),
                name: None,
                permissions: None,
                uses: None,
                container_image: None,
                service_images: Vec::new(),
                keys,
                steps: parse_steps(path, "runs", steps)?,
            });
        } else if let Some(image) = get(runs, "image").and_then(scalar) {
            if image.starts_with("docker://") {
                jobs.push(Job {
                    id: "runs".to_string(),
                    name: None,
                    permissions: None,
                    uses: None,
                    container_image: None,
                    service_images: Vec::new(),
                    keys,
                    steps: vec![Step {
                        index: 0,
                        uses: Some(image.clone()),
                        raw: vec![("uses".to_string(), image)],
                        ..Step::default()
                    }],
                });
            }
        }
    }

    Ok(PipelineDefinition {
        path: path.to_string(),
        kind: DefinitionKind::StepBundle,
        name: get(&root, "name").and_then(scalar),
        triggers: Vec::new(),
        permissions: None,
        jobs,
    })
}

fn parse_root(path: &str, source: &str) -> LintResult<Mapping> {
    let value: Value =
        serde_yaml::from_str(source).map_err(|e| LintError::parse(path, e.to_string()))?;
    match value {
        Value::Mapping(root) => Ok(root),
        Value::Null => Err(LintError::parse(path, "document is empty")),
        _ => Err(LintError::parse(path, "document root must be a mapping")),
    }
}

fn parse_job(path: &str, id: String, value: &Value) -> LintResult<Job> {
    let Value::Mapping(job) = value else {
        return Err(LintError::parse(path, format!("job '{}' must be a mapping", id)));
    };

    let container_image = match get(job, "container") {
        None | Some(Value::Null) => None,
        Some(Value::Mapping(container)) => get(container, "image").and_then(scalar),
        Some(other) => scalar(other),
    };

    let service_images = match get(job, "services") {
        Some(Value::Mapping(services)) => services
            .iter()
            .filter_map(|(name, service)| {
                let image = match service {
                    Value::Mapping(service) => get(service, "image").and_then(scalar),
                    other => scalar(other),
                };
                Some((scalar(name)?, image?))
            })
            .collect(),
        _ => Vec::new(),
    };

    let steps = match get(job, "steps") {
        Some(steps) => parse_steps(path, &id, steps)?,
        None => Vec::new(),
    };

    Ok(Job {
        name: get(job, "name").and_then(scalar),
        permissions: parse_permissions(path, get(job, "permissions"))?,
        uses: string_field(path, job, "uses")?,
        container_image,
        service_images,
        keys: job.keys().filter_map(scalar).collect(),
        steps,
        id,
    })
}

fn parse_steps(path: &str, job_id: &str, value: &Value) -> LintResult<Vec<Step>> {
    let steps = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Sequence(steps) => steps,
        _ => {
            return Err(LintError::parse(
                path,
                format!("steps of job '{}' must be a list", job_id),
            ))
        }
    };

    steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let Value::Mapping(step) = step else {
                return Err(LintError::parse(
                    path,
                    format!("step {} of job '{}' must be a mapping", index, job_id),
                ));
            };
            Ok(Step {
                index,
                name: get(step, "name").and_then(scalar),
                uses: string_field(path, step, "uses")?,
                run: string_field(path, step, "run")?,
                raw: flatten(step),
            })
        })
        .collect()
}

fn parse_permissions(path: &str, value: Option<&Value>) -> LintResult<Option<Permissions>> {
    match value {
        None => Ok(None),
        Some(Value::String(blanket)) => Ok(Some(Permissions::Blanket(blanket.clone()))),
        Some(Value::Mapping(scopes)) => Ok(Some(Permissions::Scopes(
            scopes
                .iter()
                .filter_map(|(k, v)| Some((scalar(k)?, scalar(v).unwrap_or_default())))
                .collect(),
        ))),
        // `permissions:` with no value is an explicit empty map.
        Some(Value::Null) => Ok(Some(Permissions::Scopes(Vec::new()))),
        Some(_) => Err(LintError::parse(path, "'permissions' must be a string or mapping")),
    }
}

/// Scalar step fields keep their key; `with` and `env` entries are prefixed.
fn flatten(step: &Mapping) -> Vec<(String, String)> {
    let mut raw = Vec::new();
    for (key, value) in step {
        let Some(key) = scalar(key) else { continue };
        match value {
            Value::Mapping(nested) if key == "with" || key == "env" => {
                for (k, v) in nested {
                    if let (Some(k), Some(v)) = (scalar(k), scalar(v)) {
                        raw.push((format!("{}.{}", key, k), v));
                    }
                }
            }
            other => {
                if let Some(v) = scalar(other) {
                    raw.push((key, v));
                }
            }
        }
    }
    raw
}

fn string_field(path: &str, map: &Mapping, key: &str) -> LintResult<Option<String>> {
    match get(map, key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(LintError::parse(path, format!("'{}' must be a string", key))),
    }
}

fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
