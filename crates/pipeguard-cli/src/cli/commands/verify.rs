use anyhow::Result;
use serde_json::json;

use crate::cli::args::VerifyArgs;
use crate::cli::helpers::build_verifier;
use crate::exit_codes::{EXIT_SUCCESS, EXIT_VIOLATIONS};

pub async fn run(args: VerifyArgs) -> Result<i32> {
    let verifier = build_verifier(&args.verify)?;
    let result = verifier.verify(&args.reference, &args.sha).await;

    let out = json!({
        "reference": args.reference,
        "sha": args.sha,
        "mode": verifier.context().mode(),
        "ok": result.ok,
        "error": result.error,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(if result.ok {
        EXIT_SUCCESS
    } else {
        EXIT_VIOLATIONS
    })
}
