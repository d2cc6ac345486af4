//! Verified caller identity.

use serde::{Deserialize, Serialize};

/// Identity produced by an [`crate::auth::IdentityProvider`] after credential
/// verification. Core operations only ever see verified identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    /// Stable user id; container ownership is keyed by it.
    pub uid: String,
    /// Normalized email; access entries are keyed by it.
    pub email: String,
}

impl VerifiedIdentity {
    /// Builds an identity, normalizing the email to trimmed lowercase.
    pub fn new(uid: impl Into<String>, email: impl AsRef<str>) -> Self {
        Self {
            uid: uid.into(),
            email: email.as_ref().trim().to_ascii_lowercase(),
        }
    }
}
