//! Remote action reference verification.
//!
//! Given an action reference (`owner/repo[/path]@ref`) and the commit SHA it
//! claims to pin, this crate decides whether that SHA actually resolves in the
//! source repository. It provides:
//!
//! - Reference parsing and `owner/repo` normalization
//! - An ordered bypass ladder (local actions, disabled verification, missing
//!   input, non-SHA refs) that never touches the network
//! - A single reachability probe per run and a per-run result cache
//! - A fixed error taxonomy with stable, greppable codes
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use pipeguard_verify::{ExecutionMode, HttpTransport, RefVerifier, RunContext, VerifyConfig};
//!
//! # async fn example() -> Result<(), pipeguard_verify::VerifyError> {
//! let config = VerifyConfig::from_env();
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let ctx = RunContext::new(ExecutionMode::from_env());
//! let verifier = RefVerifier::new(config, transport, ctx);
//!
//! let result = verifier
//!     .verify("actions/checkout@v4", "11bd71901bbe5b1630ceea73d27597364c9af683")
//!     .await;
//! println!("ok={} error={:?}", result.ok, result.error);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PIPEGUARD_API_URL` | API base URL (default: `https://api.github.com`) |
//! | `PIPEGUARD_GITHUB_TOKEN` / `GITHUB_TOKEN` / `GH_TOKEN` | Bearer token for lookups |
//! | `PIPEGUARD_VERIFY_REFS` | `0` or `false` disables verification |
//! | `PIPEGUARD_VERIFY_TIMEOUT` | Per-request timeout in seconds (default: 10) |
//! | `PIPEGUARD_MODE` | `strict` or `tolerant` (default: strict under CI) |

pub mod auth;
pub mod error;
pub mod reference;
pub mod run;
pub mod transport;
pub mod types;
pub mod verifier;

pub use auth::TokenProvider;
pub use error::{VerifyError, VerifyResult};
pub use reference::{is_full_sha, is_local_reference, normalize_repo, ImageRef, RemoteRef, StepRef};
pub use run::RunContext;
pub use transport::{classify_status, HttpTransport, Transport, USER_AGENT_VALUE};
pub use types::{ErrorKind, ExecutionMode, VerificationResult, VerifyConfig, COMMIT_SHA_LEN};
pub use verifier::{RefVerifier, ReferenceVerifier};
