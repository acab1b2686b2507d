use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use pipeguard_verify::ExecutionMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pipeguard",
    version,
    about = "Policy checks and pinned-reference verification for CI workflows"
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan workflows and step bundles against the policy
    Check(CheckArgs),
    /// Verify one pinned reference against the remote API
    Verify(VerifyArgs),
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Fail closed when the verification API is unreachable
    Strict,
    /// Skip verification when the API is unreachable
    Tolerant,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => ExecutionMode::Strict,
            ModeArg::Tolerant => ExecutionMode::Tolerant,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct CheckArgs {
    /// Repository root to scan
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Policy file (default: .github/pipeguard.yml, else the built-in policy)
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Exceptions file (default: .github/pipeguard-exceptions.yml if present)
    #[arg(long)]
    pub exceptions: Option<PathBuf>,

    /// Output format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write the JSON report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub verify: VerifyOptions,
}

#[derive(Debug, Args, Clone)]
pub struct VerifyArgs {
    /// Reference, e.g. actions/checkout or github/codeql-action/upload-sarif@<sha>
    #[arg(value_name = "REFERENCE")]
    pub reference: String,

    /// Claimed commit SHA
    #[arg(value_name = "SHA")]
    pub sha: String,

    #[command(flatten)]
    pub verify: VerifyOptions,
}

/// Verifier settings. Flags override the environment.
#[derive(Debug, Args, Clone, Default)]
pub struct VerifyOptions {
    /// Execution mode (default: strict under CI, tolerant otherwise)
    #[arg(long, value_enum, ignore_case = true, env = "PIPEGUARD_MODE")]
    pub mode: Option<ModeArg>,

    /// API base URL
    #[arg(long, env = "PIPEGUARD_API_URL")]
    pub api_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "PIPEGUARD_VERIFY_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Skip remote verification of pinned references
    #[arg(long)]
    pub no_verify: bool,
}
