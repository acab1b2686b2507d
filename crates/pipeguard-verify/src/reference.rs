//! Action reference parsing.
//!
//! Supports the reference formats found in a step's `uses:` field:
//! - `./.github/actions/setup` → local action inside the scanned repository
//! - `docker://alpine:3.19` → container image
//! - `actions/checkout@v4` → remote action
//! - `github/codeql-action/upload-sarif@<sha>` → remote action in a subpath

use crate::error::{VerifyError, VerifyResult};
use crate::types::COMMIT_SHA_LEN;

const DOCKER_SCHEME: &str = "docker://";

/// A parsed step reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRef {
    /// Path inside the repository being scanned.
    Local(String),

    /// Container image.
    Docker(ImageRef),

    /// Remote action or reusable workflow.
    Remote(RemoteRef),
}

impl StepRef {
    /// Parse a `uses:` value.
    ///
    /// # Examples
    ///
    /// ```
    /// use pipeguard_verify::StepRef;
    ///
    /// assert!(matches!(StepRef::parse("./.github/actions/build").unwrap(), StepRef::Local(_)));
    /// assert!(matches!(StepRef::parse("docker://alpine:3.19").unwrap(), StepRef::Docker(_)));
    ///
    /// let StepRef::Remote(remote) = StepRef::parse("github/codeql-action/upload-sarif@v3").unwrap() else {
    ///     panic!("expected remote");
    /// };
    /// assert_eq!(remote.slug(), "github/codeql-action");
    /// assert_eq!(remote.subpath.as_deref(), Some("upload-sarif"));
    /// ```
    pub fn parse(reference: &str) -> VerifyResult<Self> {
        let reference = reference.trim();

        if reference.is_empty() {
            return Err(invalid(reference, "empty reference"));
        }

        if is_local_reference(reference) {
            return Ok(Self::Local(reference.to_string()));
        }

        if let Some(image) = reference.strip_prefix(DOCKER_SCHEME) {
            return Ok(Self::Docker(ImageRef::parse(image)?));
        }

        Ok(Self::Remote(RemoteRef::parse(reference)?))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn as_remote(&self) -> Option<&RemoteRef> {
        match self {
            Self::Remote(remote) => Some(remote),
            _ => None,
        }
    }
}

/// Remote reference `owner/repo[/subpath]@git_ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub owner: String,
    pub repo: String,
    pub subpath: Option<String>,
    /// Empty when the reference carries no `@...` part.
    pub git_ref: String,
}

impl RemoteRef {
    pub fn parse(reference: &str) -> VerifyResult<Self> {
        let reference = reference.trim();
        let (path, git_ref) = match reference.split_once('@') {
            Some((path, git_ref)) => (path, git_ref),
            None => (reference, ""),
        };

        let mut segments = path.split('/');
        let owner = segments.next().unwrap_or_default();
        let repo = segments.next().unwrap_or_default();
        validate_segment(reference, owner, "owner")?;
        validate_segment(reference, repo, "repository")?;

        let rest: Vec<&str> = segments.collect();
        if rest.iter().any(|s| s.is_empty()) {
            return Err(invalid(reference, "empty path segment"));
        }
        let subpath = if rest.is_empty() {
            None
        } else {
            Some(rest.join("/"))
        };

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            subpath,
            git_ref: git_ref.to_string(),
        })
    }

    /// Normalized `owner/repo`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Pinned to a full-length commit SHA.
    pub fn is_sha_pinned(&self) -> bool {
        is_full_sha(&self.git_ref)
    }

    /// The reference without its `@...` suffix.
    pub fn path(&self) -> String {
        match &self.subpath {
            Some(sub) => format!("{}/{}/{}", self.owner, self.repo, sub),
            None => self.slug(),
        }
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.git_ref.is_empty() {
            write!(f, "{}", self.path())
        } else {
            write!(f, "{}@{}", self.path(), self.git_ref)
        }
    }
}

/// Container image reference `name[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    pub fn parse(image: &str) -> VerifyResult<Self> {
        let image = image.trim();
        let image = image.strip_prefix(DOCKER_SCHEME).unwrap_or(image);
        if image.is_empty() {
            return Err(invalid(image, "empty image reference"));
        }

        let (rest, digest) = match image.split_once('@') {
            Some((rest, digest)) => (rest, Some(digest.to_string())),
            None => (image, None),
        };

        // A ':' before the last '/' belongs to a registry port, not a tag.
        let last_slash = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match rest[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                (&rest[..split], Some(rest[split + 1..].to_string()))
            }
            None => (rest, None),
        };

        if name.is_empty() {
            return Err(invalid(image, "empty image name"));
        }

        Ok(Self {
            name: name.to_string(),
            tag,
            digest,
        })
    }

    /// Pinned by `sha256:<64 hex>` content digest.
    pub fn is_digest_pinned(&self) -> bool {
        self.digest
            .as_deref()
            .and_then(|d| d.strip_prefix("sha256:"))
            .map(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false)
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// References that point inside the scanned repository.
pub fn is_local_reference(reference: &str) -> bool {
    let reference = reference.trim();
    reference.starts_with("./") || reference.starts_with("../") || reference == "."
}

/// Exactly [`COMMIT_SHA_LEN`] hex digits.
pub fn is_full_sha(value: &str) -> bool {
    value.len() == COMMIT_SHA_LEN && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Reduce a reference to its owning `owner/repo`.
///
/// Strips any trailing `@...` and drops subpath segments.
///
/// ```
/// use pipeguard_verify::normalize_repo;
///
/// assert_eq!(normalize_repo("actions/checkout@v4").unwrap(), "actions/checkout");
/// assert_eq!(
///     normalize_repo("github/codeql-action/upload-sarif@abc").unwrap(),
///     "github/codeql-action"
/// );
/// assert!(normalize_repo("checkout").is_err());
/// ```
pub fn normalize_repo(reference: &str) -> VerifyResult<String> {
    RemoteRef::parse(reference).map(|r| r.slug())
}

fn validate_segment(reference: &str, segment: &str, what: &str) -> VerifyResult<()> {
    if segment.is_empty() {
        return Err(invalid(reference, &format!("missing {}", what)));
    }

    if segment == "." || segment == ".." {
        return Err(invalid(reference, &format!("{} cannot be '{}'", what, segment)));
    }

    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(invalid(
            reference,
            &format!(
                "{} may only contain letters, digits, '-', '_' and '.'",
                what
            ),
        ));
    }

    Ok(())
}

fn invalid(reference: &str, reason: &str) -> VerifyError {
    VerifyError::InvalidReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    }
}
