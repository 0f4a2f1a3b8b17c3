//! Rate limit key handling.

use sha2::{Digest, Sha256};

use crate::error::{Result, TurnstileError};

/// Hex characters kept from a client address digest.
const CLIENT_KEY_LEN: usize = 16;

/// Namespace for caller-supplied session identifiers.
const SESSION_PREFIX: &str = "session:";
/// Namespace for hashed client addresses.
const CLIENT_PREFIX: &str = "client:";

/// A validated, non-empty key identifying whose requests are being counted.
///
/// Session ids and client addresses live in separate namespaces, so no
/// session id can land on the window of a client-derived key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Build a key from a caller-supplied session identifier.
    ///
    /// The id is opaque and kept byte for byte; only empty or
    /// whitespace-only ids are rejected.
    pub fn new(session_id: &str) -> Result<Self> {
        if session_id.trim().is_empty() {
            return Err(TurnstileError::InvalidInput("Session ID required".into()));
        }
        Ok(Self(format!("{}{}", SESSION_PREFIX, session_id)))
    }

    /// Derive a key from a client address without storing the address itself.
    pub fn for_client(addr: &str, salt: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(addr.as_bytes());
        hasher.update(salt.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(format!("{}{}", CLIENT_PREFIX, &digest[..CLIENT_KEY_LEN]))
    }

    /// The namespaced key handed to the limiter.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_kept_verbatim() {
        let key = SessionKey::new("  abc-123 ").unwrap();
        assert_eq!(key.as_str(), "session:  abc-123 ");
        assert_ne!(key, SessionKey::new("abc-123").unwrap());
    }

    #[test]
    fn test_empty_session_key_rejected() {
        assert!(matches!(
            SessionKey::new(""),
            Err(TurnstileError::InvalidInput(_))
        ));
        assert!(SessionKey::new("   ").is_err());
    }

    #[test]
    fn test_client_key_is_stable_and_salted() {
        let a = SessionKey::for_client("10.0.0.1", "salt");
        let b = SessionKey::for_client("10.0.0.1", "salt");
        let other_salt = SessionKey::for_client("10.0.0.1", "pepper");
        let other_addr = SessionKey::for_client("10.0.0.2", "salt");

        assert_eq!(a, b);
        assert_ne!(a, other_salt);
        assert_ne!(a, other_addr);

        let digest = a.as_str().strip_prefix("client:").unwrap();
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!a.as_str().contains("10.0.0.1"));
    }

    #[test]
    fn test_session_ids_cannot_alias_client_keys() {
        let client = SessionKey::for_client("203.0.113.7", "salt");
        let digest = client.as_str().strip_prefix("client:").unwrap();

        assert_ne!(SessionKey::new(digest).unwrap(), client);
        assert_ne!(SessionKey::new(client.as_str()).unwrap(), client);
    }
}
