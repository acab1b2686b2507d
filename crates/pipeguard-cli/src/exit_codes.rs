//! Exit codes for pipeguard.
//! These codes are part of the public contract: CI jobs branch on them.

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_VIOLATIONS: i32 = 1; // Unexempted enforced violations, or a failed verification
pub const EXIT_CONFIG_ERROR: i32 = 2; // Unreadable/unparseable definitions, invalid policy or exceptions
