//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for identifiers handed out by the remote
//! object-store service. Validity is checked at construction time.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Identifier assigned by the remote object-store service
///
/// Opaque to TreeSync; the only invariant is that it is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a RemoteId, rejecting empty strings
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidId(
                "remote id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_id_roundtrip() {
        let id = RemoteId::new("1a2b3c").unwrap();
        assert_eq!(id.as_str(), "1a2b3c");
        assert_eq!(id.to_string(), "1a2b3c");
    }

    #[test]
    fn test_remote_id_rejects_empty() {
        assert!(RemoteId::new("").is_err());
    }
}
