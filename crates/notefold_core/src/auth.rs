//! Identity provider seam.
//!
//! # Responsibility
//! - Define the contract the core consumes to turn a credential into a
//!   [`VerifiedIdentity`].
//! - Ship a static token table provider for the CLI and tests.
//!
//! # Invariants
//! - Credentials are never logged.

use crate::config::IdentityConfig;
use crate::model::identity::VerifiedIdentity;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Credential verification failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Credential is blank.
    MissingCredential,
    /// Credential did not verify.
    InvalidCredential,
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "authentication failed: missing credential"),
            Self::InvalidCredential => write!(f, "authentication failed: invalid credential"),
        }
    }
}

impl Error for AuthError {}

/// External collaborator that verifies credentials.
pub trait IdentityProvider {
    fn verify(&self, credential: &str) -> Result<VerifiedIdentity, AuthError>;
}

impl<P: IdentityProvider + ?Sized> IdentityProvider for &P {
    fn verify(&self, credential: &str) -> Result<VerifiedIdentity, AuthError> {
        (**self).verify(credential)
    }
}

/// Provider backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, VerifiedIdentity>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one token.
    pub fn with_identity(
        mut self,
        token: impl Into<String>,
        uid: impl Into<String>,
        email: impl AsRef<str>,
    ) -> Self {
        self.tokens
            .insert(token.into(), VerifiedIdentity::new(uid, email));
        self
    }

    /// Builds the table from configured identities.
    pub fn from_config(identities: &[IdentityConfig]) -> Self {
        identities.iter().fold(Self::new(), |provider, identity| {
            provider.with_identity(&identity.token, &identity.uid, &identity.email)
        })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn verify(&self, credential: &str) -> Result<VerifiedIdentity, AuthError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}
