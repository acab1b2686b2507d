//! Token authentication for commit lookups.
//!
//! Credentials are read from the ambient environment only; the verifier never
//! stores or writes them anywhere.

/// Environment variables checked for a token, in order.
const TOKEN_VARS: &[&str] = &["PIPEGUARD_GITHUB_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"];

/// Token provider for API authentication.
#[derive(Clone, Default)]
pub enum TokenProvider {
    /// Static token (from config or env).
    Static(String),

    /// No authentication.
    #[default]
    None,
}

impl TokenProvider {
    /// Create a static token provider.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// Create from environment variables, falling back to no auth.
    pub fn from_env() -> Self {
        token_from_env().map(Self::Static).unwrap_or(Self::None)
    }

    /// Get the current token.
    pub fn get_token(&self) -> Option<&str> {
        match self {
            Self::Static(token) => Some(token),
            Self::None => None,
        }
    }

    /// Check if authentication is configured.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }
}

// Manual impl: never print the token.
impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("TokenProvider::Static(***)"),
            Self::None => f.write_str("TokenProvider::None"),
        }
    }
}

/// First non-empty token from the environment.
pub(crate) fn token_from_env() -> Option<String> {
    TOKEN_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for name in TOKEN_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_none() {
        clear();
        let provider = TokenProvider::from_env();
        assert!(!provider.is_authenticated());
        assert_eq!(provider.get_token(), None);
    }

    #[test]
    #[serial]
    fn test_from_env_precedence() {
        clear();
        std::env::set_var("GH_TOKEN", "gh");
        std::env::set_var("GITHUB_TOKEN", "");
        assert_eq!(TokenProvider::from_env().get_token(), Some("gh"));

        std::env::set_var("PIPEGUARD_GITHUB_TOKEN", "explicit");
        assert_eq!(TokenProvider::from_env().get_token(), Some("explicit"));
        clear();
    }

    #[test]
    fn test_debug_redacts_token() {
        let provider = TokenProvider::static_token("ghp_secret");
        assert!(!format!("{:?}", provider).contains("ghp_secret"));
    }
}
