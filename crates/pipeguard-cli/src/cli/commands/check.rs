use anyhow::{Context, Result};
use pipeguard_lint::report::ExemptedViolation;
use pipeguard_lint::{
    decide, discover, load_pipelines, load_step_bundles, resolve_exceptions, resolve_policy,
    Decision, PatternCompiler, ScanReport, Scanner, Violation,
};
use tracing::info;

use crate::cli::args::{CheckArgs, OutputFormat};
use crate::cli::helpers::build_verifier;

pub async fn run(args: CheckArgs) -> Result<i32> {
    let root = &args.root;

    let policy = resolve_policy(root, args.policy.as_deref()).context("loading policy")?;
    let exceptions =
        resolve_exceptions(root, args.exceptions.as_deref()).context("loading exceptions")?;

    let discovered =
        discover(root).with_context(|| format!("discovering definitions in {}", root.display()))?;
    let pipelines = load_pipelines(&discovered.pipelines)?;
    let bundles = load_step_bundles(&discovered.bundles)?;

    let verifier = build_verifier(&args.verify)?;
    let mode = verifier.context().mode();

    let mut scanner = Scanner::new(&policy, PatternCompiler::default(), &verifier);
    let mut violations = scanner.scan_pipelines(&pipelines).await;
    violations.extend(scanner.scan_step_bundles(&bundles).await);

    let decision = decide(violations, &exceptions, mode);
    let definitions = pipelines.len() + bundles.len();
    info!(
        definitions,
        remaining = decision.remaining.len(),
        advisories = decision.advisories.len(),
        exempted = decision.exempted.len(),
        mode = %mode,
        "check complete"
    );

    let report = ScanReport::new(&decision, definitions);
    match args.format {
        OutputFormat::Json => print!("{}", report.to_json()?),
        OutputFormat::Text => print_text(&decision, definitions),
    }

    if let Some(path) = &args.report {
        report
            .write(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    Ok(decision.exit_code())
}

fn print_text(decision: &Decision, definitions: usize) {
    println!(
        "pipeguard check: {} definition(s), mode {}",
        definitions, decision.mode
    );

    for v in decision.remaining.iter().chain(&decision.advisories) {
        println!("{}", format_violation(v));
    }
    for ExemptedViolation {
        violation,
        rationale,
    } in &decision.exempted
    {
        println!("[exempted] {} ({})", format_violation(violation), rationale);
    }

    let summary = decision.summary();
    println!();
    println!(
        "Summary: {} total ({} errors, {} warnings, {} exempted)",
        summary.total, summary.errors, summary.warnings, summary.exempted
    );
    println!("{}", if decision.exit_ok { "PASS" } else { "FAIL" });
}

fn format_violation(v: &Violation) -> String {
    format!(
        "[{}] {} {}: {} (rule {})",
        v.severity, v.code, v.location, v.message, v.rule_id
    )
}
