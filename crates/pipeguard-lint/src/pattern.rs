//! Safe regular expression compiler for policy patterns.
//!
//! Policy authors supply regular expressions that are evaluated against
//! workflow script text. A pattern is only handed to the matcher engine after
//! a structural scan has rejected the shapes that cause catastrophic
//! backtracking in backtracking engines:
//!
//! - nested unbounded repetition: `(a+)+`, `(.*x)*`, `((ab)+c){2,}`
//! - repeated alternation with overlapping branches: `(a|aa)+`, `(x|x)*`
//!
//! The scan follows the `x` flag, so a `#` comment cannot hide a group
//! boundary from it.
//!
//! Bounded outer repetition stays legal (`(\.[0-9]+){0,2}$`).
//!
//! # Security Limits
//!
//! - Max pattern length: 1024 bytes
//! - Max upper bound for a repeated group with an unbounded body: 10
//! - Compiled program size: 1 MiB

use std::fmt;
use std::sync::Arc;

const MAX_PATTERN_LENGTH: usize = 1024;
const MAX_NESTED_REPEAT: u32 = 10;
const COMPILED_SIZE_LIMIT: usize = 1 << 20;

/// Pattern compilation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// Structurally prone to catastrophic backtracking.
    #[error("unsafe pattern '{pattern}': {reason}")]
    Unsafe { pattern: String, reason: String },

    #[error("pattern length {len} exceeds maximum {max}")]
    TooLong { len: usize, max: usize },

    /// Rejected by the matcher engine or malformed.
    #[error("invalid pattern '{pattern}': {message}")]
    Invalid { pattern: String, message: String },
}

impl PatternError {
    /// Stable violation code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unsafe { .. } | Self::TooLong { .. } => "unsafe_regex",
            Self::Invalid { .. } => "invalid_regex",
        }
    }
}

/// An executable matcher.
pub trait Matcher: Send + Sync + fmt::Debug {
    fn is_match(&self, text: &str) -> bool;

    /// All non-overlapping matches, left to right.
    fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str>;
}

/// Builds matchers from patterns that already passed the safety scan.
pub trait MatcherEngine: Send + Sync + fmt::Debug {
    fn build(&self, pattern: &str) -> Result<Box<dyn Matcher>, PatternError>;
}

/// Default engine backed by the `regex` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexEngine;

impl MatcherEngine for RegexEngine {
    fn build(&self, pattern: &str) -> Result<Box<dyn Matcher>, PatternError> {
        let regex = regex::RegexBuilder::new(pattern)
            .size_limit(COMPILED_SIZE_LIMIT)
            .dfa_size_limit(COMPILED_SIZE_LIMIT)
            .build()
            .map_err(|e| PatternError::Invalid {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
        Ok(Box::new(RegexMatcher(regex)))
    }
}

#[derive(Debug)]
struct RegexMatcher(regex::Regex);

impl Matcher for RegexMatcher {
    fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.0.find_iter(text).map(|m| m.as_str()).collect()
    }
}

/// A pattern that passed the safety scan, paired with its matcher.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    matcher: Arc<dyn Matcher>,
}

impl CompiledPattern {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    pub fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.matcher.find_all(text)
    }
}

/// Compiler that applies the safety scan before building a matcher.
#[derive(Debug, Clone)]
pub struct PatternCompiler {
    engine: Arc<dyn MatcherEngine>,
}

impl Default for PatternCompiler {
    fn default() -> Self {
        Self {
            engine: Arc::new(RegexEngine),
        }
    }
}

impl PatternCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitute the matcher engine. Call sites keep using [`compile`](Self::compile).
    pub fn with_engine(engine: Arc<dyn MatcherEngine>) -> Self {
        Self { engine }
    }

    /// Compile a pattern, rejecting unsafe shapes before the engine sees it.
    pub fn compile(&self, pattern: &str) -> Result<CompiledPattern, PatternError> {
        check_safety(pattern)?;
        let matcher = self.engine.build(pattern)?;
        Ok(CompiledPattern {
            source: pattern.to_string(),
            matcher: Arc::from(matcher),
        })
    }
}

/// Compile with the default engine.
///
/// ```
/// use pipeguard_lint::pattern::compile;
///
/// assert!(compile("(.+)+").is_err());
/// let version = compile(r"(\.[0-9]+){0,2}$").unwrap();
/// assert!(version.is_match("1.2.3"));
/// ```
pub fn compile(pattern: &str) -> Result<CompiledPattern, PatternError> {
    PatternCompiler::default().compile(pattern)
}

/// Structural scan for backtracking hazards. Does not compile anything.
pub fn check_safety(pattern: &str) -> Result<(), PatternError> {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(PatternError::TooLong {
            len: pattern.len(),
            max: MAX_PATTERN_LENGTH,
        });
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut stack = vec![Frame::default()];
    let mut last = Atom::None;
    let mut i = 0;

    while i < chars.len() {
        // Under `x`, whitespace is insignificant and `#` comments run to end of line.
        if stack.last().is_some_and(|f| f.verbose) {
            if chars[i].is_whitespace() {
                i += 1;
                continue;
            }
            if chars[i] == '#' {
                i = chars[i..]
                    .iter()
                    .position(|&c| c == '\n')
                    .map_or(chars.len(), |p| i + p + 1);
                continue;
            }
        }

        match chars[i] {
            '\\' => {
                let end = escape_end(pattern, &chars, i)?;
                push_text(&mut stack, &chars[i..end]);
                last = Atom::Simple;
                i = end;
            }
            '[' => {
                let end = class_end(pattern, &chars, i)?;
                push_text(&mut stack, &chars[i..end]);
                last = Atom::Simple;
                i = end;
            }
            '(' => {
                let verbose = stack.last().is_some_and(|f| f.verbose);
                if let Some(end) = flag_group_end(&chars, i) {
                    // `(?i)` sets flags for the rest of the enclosing group; it has no body to repeat.
                    if let Some(frame) = stack.last_mut() {
                        frame.verbose = verbose_after(&chars[i + 2..end - 1], verbose);
                    }
                    i = end;
                    last = Atom::None;
                    continue;
                }
                let body = group_body_start(pattern, &chars, i)?;
                let flags = if chars.get(i + 1) == Some(&'?') && chars[body - 1] == ':' {
                    &chars[i + 2..body - 1]
                } else {
                    &[][..]
                };
                stack.push(Frame {
                    verbose: verbose_after(flags, verbose),
                    ..Frame::default()
                });
                last = Atom::None;
                i = body;
            }
            ')' => {
                if stack.len() == 1 {
                    return Err(invalid(pattern, "unbalanced ')'"));
                }
                let mut frame = stack.pop().unwrap_or_default();
                frame.branches.push(std::mem::take(&mut frame.current));
                let overlapping = has_overlap(&frame.branches);
                let text = format!("({})", frame.branches.join("|"));

                if let Some(parent) = stack.last_mut() {
                    parent.current.push_str(&text);
                    parent.unbounded |= frame.unbounded;
                }
                last = Atom::Group {
                    unbounded: frame.unbounded,
                    overlapping,
                };
                i += 1;
            }
            '|' => {
                if let Some(frame) = stack.last_mut() {
                    let branch = std::mem::take(&mut frame.current);
                    frame.branches.push(branch);
                }
                last = Atom::None;
                i += 1;
            }
            '*' | '+' | '?' | '{' => {
                let Some((quant, end)) = parse_quantifier(&chars, i) else {
                    // A '{' that does not open a repetition is a literal.
                    push_text(&mut stack, &chars[i..i + 1]);
                    last = Atom::Simple;
                    i += 1;
                    continue;
                };

                if let Atom::Group {
                    unbounded,
                    overlapping,
                } = last
                {
                    let repeats = quant.max.map_or(true, |m| m > 1);
                    let wide = quant.max.map_or(true, |m| m > MAX_NESTED_REPEAT);
                    if repeats && wide && unbounded {
                        return Err(PatternError::Unsafe {
                            pattern: pattern.to_string(),
                            reason: "nested unbounded quantifier".to_string(),
                        });
                    }
                    if repeats && wide && overlapping {
                        return Err(PatternError::Unsafe {
                            pattern: pattern.to_string(),
                            reason: "repeated alternation with overlapping branches".to_string(),
                        });
                    }
                }

                if let Some(frame) = stack.last_mut() {
                    if quant.max.is_none() {
                        frame.unbounded = true;
                    }
                }
                push_text(&mut stack, &chars[i..end]);
                last = Atom::None;
                i = end;
            }
            c => {
                push_text(&mut stack, &[c]);
                last = Atom::Simple;
                i += 1;
            }
        }
    }

    if stack.len() != 1 {
        return Err(invalid(pattern, "unclosed group"));
    }

    Ok(())
}

#[derive(Debug, Default)]
struct Frame {
    /// Body contains an unbounded repetition at any depth.
    unbounded: bool,
    /// `x` flag in effect.
    verbose: bool,
    branches: Vec<String>,
    current: String,
}

/// State of the `x` flag after applying a flag list such as `ix` or `i-x`.
fn verbose_after(flags: &[char], mut verbose: bool) -> bool {
    let mut negated = false;
    for &c in flags {
        match c {
            '-' => negated = true,
            'x' => verbose = !negated,
            _ => {}
        }
    }
    verbose
}

#[derive(Debug, Clone, Copy)]
enum Atom {
    None,
    Simple,
    Group { unbounded: bool, overlapping: bool },
}

#[derive(Debug, Clone, Copy)]
struct Quantifier {
    max: Option<u32>,
}

fn push_text(stack: &mut [Frame], text: &[char]) {
    if let Some(frame) = stack.last_mut() {
        frame.current.extend(text);
    }
}

fn invalid(pattern: &str, message: &str) -> PatternError {
    PatternError::Invalid {
        pattern: pattern.to_string(),
        message: message.to_string(),
    }
}

/// Two alternatives can match the same text: duplicates, an empty branch, or
/// one branch a literal prefix of another.
fn has_overlap(branches: &[String]) -> bool {
    if branches.len() < 2 {
        return false;
    }
    if branches.iter().any(|b| b.is_empty()) {
        return true;
    }
    for (i, a) in branches.iter().enumerate() {
        for b in &branches[i + 1..] {
            if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                return true;
            }
        }
    }
    false
}

fn escape_end(pattern: &str, chars: &[char], i: usize) -> Result<usize, PatternError> {
    let Some(&next) = chars.get(i + 1) else {
        return Err(invalid(pattern, "trailing backslash"));
    };

    if matches!(next, 'p' | 'P' | 'x' | 'u' | 'U') && chars.get(i + 2) == Some(&'{') {
        return chars[i + 2..]
            .iter()
            .position(|&c| c == '}')
            .map(|p| i + 2 + p + 1)
            .ok_or_else(|| invalid(pattern, "unterminated escape"));
    }

    let width = match next {
        'x' => 4,
        'u' => 6,
        'U' => 10,
        _ => 2,
    };
    Ok((i + width).min(chars.len()))
}

fn class_end(pattern: &str, chars: &[char], i: usize) -> Result<usize, PatternError> {
    let mut j = i + 1;
    if chars.get(j) == Some(&'^') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }

    let mut depth = 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => {
                j += 2;
                continue;
            }
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(j + 1);
                }
            }
            _ => {}
        }
        j += 1;
    }

    Err(invalid(pattern, "unterminated character class"))
}

/// End of a flag-only group such as `(?i)` or `(?-x)`.
fn flag_group_end(chars: &[char], i: usize) -> Option<usize> {
    if chars.get(i + 1) != Some(&'?') {
        return None;
    }
    let mut j = i + 2;
    while let Some(&c) = chars.get(j) {
        match c {
            ')' => return Some(j + 1),
            c if c.is_ascii_alphabetic() || c == '-' => j += 1,
            _ => return None,
        }
    }
    None
}

/// Index of the first body character after `(`, `(?:`, `(?i:`, `(?P<name>`.
fn group_body_start(pattern: &str, chars: &[char], i: usize) -> Result<usize, PatternError> {
    if chars.get(i + 1) != Some(&'?') {
        return Ok(i + 1);
    }

    let named = chars.get(i + 2) == Some(&'<')
        || (chars.get(i + 2) == Some(&'P') && chars.get(i + 3) == Some(&'<'));
    let terminator = if named { '>' } else { ':' };

    chars[i + 2..]
        .iter()
        .position(|&c| c == terminator)
        .map(|p| i + 2 + p + 1)
        .ok_or_else(|| invalid(pattern, "malformed group prefix"))
}

/// Parse a quantifier at `i`; `None` if `{` does not start a repetition.
fn parse_quantifier(chars: &[char], i: usize) -> Option<(Quantifier, usize)> {
    let (quant, mut end) = match chars[i] {
        '*' | '+' => (Quantifier { max: None }, i + 1),
        '?' => (Quantifier { max: Some(1) }, i + 1),
        '{' => {
            let close = i + chars[i..].iter().position(|&c| c == '}')?;
            let body: String = chars[i + 1..close].iter().collect();
            let (min, max) = match body.split_once(',') {
                Some((min, max)) => (min.trim(), Some(max.trim())),
                None => (body.trim(), None),
            };

            let is_num = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
            let parse = |s: &str| s.parse::<u32>().unwrap_or(u32::MAX);

            let max = match max {
                None if is_num(min) => Some(parse(min)),
                Some("") if is_num(min) => None,
                Some(max) if is_num(max) && (min.is_empty() || is_num(min)) => Some(parse(max)),
                _ => return None,
            };
            (Quantifier { max }, close + 1)
        }
        _ => return None,
    };

    // Lazy / possessive suffix.
    if matches!(chars.get(end), Some('?') | Some('+')) {
        end += 1;
    }
    Some((quant, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_nested_unbounded_rejected() {
        for pattern in ["(.+)+", "(a*)*", "(a+)*b", "((ab)+c)+", "(?:x+y)*", "(a+){2,}", "(a+){1,50}"] {
            let err = compile(pattern).unwrap_err();
            assert!(
                matches!(err, PatternError::Unsafe { .. }),
                "{} should be unsafe, got {:?}",
                pattern,
                err
            );
            assert_eq!(err.code(), "unsafe_regex");
        }
    }

    #[test]
    fn test_overlapping_alternation_rejected() {
        for pattern in ["(a|aa)+", "(x|x)*", r"(\d|\d+)+", "(|a)+"] {
            assert!(
                matches!(compile(pattern), Err(PatternError::Unsafe { .. })),
                "{} should be unsafe",
                pattern
            );
        }
    }

    #[test]
    fn test_bounded_repetition_accepted() {
        let pattern = compile(r"(\.[0-9]+){0,2}$").unwrap();
        assert!(pattern.is_match("v1.2.3"));
        assert!(pattern.is_match("1"));
        assert_eq!(pattern.as_str(), r"(\.[0-9]+){0,2}$");
    }

    #[test]
    fn test_common_policy_patterns_accepted() {
        for pattern in [
            r"\$\{\{\s*secrets\.[A-Za-z0-9_]+\s*\}\}",
            r"\$\{\{\s*github\.event\.(issue|pull_request|comment)\.(title|body)\s*\}\}",
            r"curl\s+[^|]*\|\s*(ba)?sh",
            r"(?i)password\s*[:=]",
            r"[a-z]+(-[a-z]+)?",
            r"(a|b)+",
            r"(a+)?",
            r"x{2}",
            r"[[:alpha:]]+",
            r"\p{L}+",
            r"(?P<name>\w+)=",
        ] {
            assert!(compile(pattern).is_ok(), "{} should compile", pattern);
        }
    }

    #[test]
    fn test_literal_brace_is_not_quantifier() {
        assert!(check_safety(r"\{x}").is_ok());
        assert!(check_safety("a{b}").is_ok());
    }

    #[test]
    fn test_verbose_comment_cannot_hide_group_boundary() {
        // Read by the engine as `(a+)+$`.
        for pattern in ["(?x)(a+#)(\n)+$", "(?x:(a+#)(\n)+)", "(?ix)( a + ) +"] {
            assert!(
                matches!(compile(pattern), Err(PatternError::Unsafe { .. })),
                "{:?} should be unsafe",
                pattern
            );
        }
    }

    #[test]
    fn test_verbose_flag_scoping() {
        // `#` is literal once `x` is switched off or outside the flagged group.
        assert!(compile("(?x)(?-x)(a+#)(\n)+$").is_ok());
        assert!(compile("(?x:a)(b+#)(\n)+$").is_ok());
        assert!(compile(r"(?x) secrets \. [A-Z_]+  # token names").is_ok());
        assert!(check_safety(r"(?x)[#](a)+").is_ok());
    }

    #[test]
    fn test_too_long() {
        let pattern = "a".repeat(MAX_PATTERN_LENGTH + 1);
        assert!(matches!(
            compile(&pattern),
            Err(PatternError::TooLong { .. })
        ));
    }

    #[test]
    fn test_malformed_patterns_invalid() {
        for pattern in ["(abc", "abc)", "[abc", "abc\\"] {
            let err = compile(pattern).unwrap_err();
            assert_eq!(err.code(), "invalid_regex", "{}", pattern);
        }
        // Structurally fine, rejected by the engine.
        assert!(matches!(
            compile(r"\p{NotAUnicodeClass}"),
            Err(PatternError::Invalid { .. })
        ));
    }

    #[test]
    fn test_find_all() {
        let pattern = compile(r"secrets\.[A-Z_]+").unwrap();
        assert_eq!(
            pattern.find_all("echo ${{ secrets.A }} ${{ secrets.B_C }}"),
            vec!["secrets.A", "secrets.B_C"]
        );
    }

    #[derive(Debug, Default)]
    struct RecordingEngine {
        built: Mutex<Vec<String>>,
    }

    #[derive(Debug)]
    struct AlwaysMatch;

    impl Matcher for AlwaysMatch {
        fn is_match(&self, _text: &str) -> bool {
            true
        }

        fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str> {
            vec![text]
        }
    }

    impl MatcherEngine for RecordingEngine {
        fn build(&self, pattern: &str) -> Result<Box<dyn Matcher>, PatternError> {
            self.built.lock().unwrap().push(pattern.to_string());
            Ok(Box::new(AlwaysMatch))
        }
    }

    #[test]
    fn test_engine_override_is_used() {
        let engine = Arc::new(RecordingEngine::default());
        let compiler = PatternCompiler::with_engine(engine.clone());

        let pattern = compiler.compile("never-matches-anything").unwrap();
        assert!(pattern.is_match("unrelated text"));
        assert_eq!(*engine.built.lock().unwrap(), vec!["never-matches-anything"]);
    }

    #[test]
    fn test_engine_override_never_sees_unsafe_pattern() {
        let engine = Arc::new(RecordingEngine::default());
        let compiler = PatternCompiler::with_engine(engine.clone());

        assert!(compiler.compile("(.+)+").is_err());
        assert!(engine.built.lock().unwrap().is_empty());
    }
}
