//! Client key handling.

use std::fmt;

/// Key shared by every request whose caller could not be identified.
pub const FALLBACK_KEY: &str = "unknown";

/// A key that identifies the caller a rate limit window belongs to.
///
/// The key is opaque: equality is exact string equality and no
/// normalization is performed on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a new client key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The shared bucket for callers without a usable address.
    ///
    /// All such requests count against one window instead of bypassing
    /// the limiter.
    pub fn fallback() -> Self {
        Self(FALLBACK_KEY.to_string())
    }

    /// Whether this is the shared fallback key.
    pub fn is_fallback(&self) -> bool {
        self.0 == FALLBACK_KEY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ClientKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_equality_is_exact() {
        assert_eq!(ClientKey::from("192.168.1.1"), ClientKey::new("192.168.1.1"));
        assert_ne!(ClientKey::from("192.168.1.1"), ClientKey::from(" 192.168.1.1"));
        assert_ne!(ClientKey::from("Host"), ClientKey::from("host"));
    }

    #[test]
    fn test_fallback_key() {
        let key = ClientKey::fallback();
        assert!(key.is_fallback());
        assert_eq!(key.to_string(), FALLBACK_KEY);
        assert_eq!(key.as_str(), FALLBACK_KEY);
        assert!(!ClientKey::from("10.0.0.1").is_fallback());
    }
}
