//! Policy scanner for CI workflow and step-bundle definitions.
//!
//! Pipeline: [`discovery`] finds documents, [`model`] parses them, the
//! [`scan`] module evaluates a [`Policy`] against them (calling the pattern
//! compiler and the reference verifier), and [`report`] applies exceptions
//! and decides the exit status.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use pipeguard_lint::{decide, discover, load_pipelines, resolve_policy, scan_pipelines, ExceptionSet};
//! use pipeguard_verify::{ExecutionMode, HttpTransport, RefVerifier, RunContext, VerifyConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Path::new(".");
//! let policy = resolve_policy(root, None)?;
//! let pipelines = load_pipelines(&discover(root)?.pipelines)?;
//!
//! let config = VerifyConfig::from_env();
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let ctx = RunContext::new(ExecutionMode::from_env());
//! let verifier = RefVerifier::new(config, transport, ctx.clone());
//!
//! let violations = scan_pipelines(&pipelines, &policy, &verifier).await;
//! let decision = decide(violations, &ExceptionSet::empty(), ctx.mode());
//! std::process::exit(decision.exit_code());
//! # }
//! ```

pub mod discovery;
pub mod error;
pub mod model;
pub mod pattern;
pub mod policy;
pub mod report;
pub mod scan;
pub mod violation;

pub use discovery::{discover, load_pipelines, load_step_bundles, Discovered, DiscoveredFile};
pub use error::{LintError, LintResult};
pub use model::{
    parse_pipeline, parse_step_bundle, DefinitionKind, Job, Permissions, PipelineDefinition, Step,
};
pub use pattern::{compile, CompiledPattern, Matcher, MatcherEngine, PatternCompiler, PatternError};
pub use policy::{resolve_policy, Enforcement, Policy, Rule, RuleCheck};
pub use report::{
    decide, resolve_exceptions, Decision, Exception, ExceptionSet, ScanReport, Summary,
};
pub use scan::{scan_pipelines, scan_step_bundles, Scanner};
pub use violation::{Category, Location, Severity, Violation};
