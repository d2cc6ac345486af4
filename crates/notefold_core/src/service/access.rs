//! Access-control engine.
//!
//! # Responsibility
//! - Decide whether an identity may read or write one container.
//! - Normalize grant requests into a single entry set before propagation.
//!
//! # Invariants
//! - Grant normalization is pure; it never touches the store.
//! - Propagation appends; it never merges, replaces or upgrades entries.

use crate::model::container::{AccessEntry, Container, Visibility};
use crate::model::group::{normalize_email, NamedGroup};
use crate::model::identity::VerifiedIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Grant payload; the group variant expands to the group's members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrantRequest {
    Explicit {
        emails: Vec<String>,
    },
    Grouped {
        emails: Vec<String>,
        group_name: String,
    },
}

impl GrantRequest {
    pub fn explicit<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Explicit {
            emails: emails.into_iter().map(Into::into).collect(),
        }
    }

    pub fn grouped<I, S>(emails: I, group_name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Grouped {
            emails: emails.into_iter().map(Into::into).collect(),
            group_name: group_name.into(),
        }
    }

    pub fn emails(&self) -> &[String] {
        match self {
            Self::Explicit { emails } | Self::Grouped { emails, .. } => emails,
        }
    }

    pub fn group_name(&self) -> Option<&str> {
        match self {
            Self::Explicit { .. } => None,
            Self::Grouped { group_name, .. } => Some(group_name.as_str()),
        }
    }
}

/// Which containers a grant reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    /// Target plus every descendant owned by the target's owner.
    #[default]
    Subtree,
    /// Target only; existing children keep their snapshot.
    ContainerOnly,
}

/// Why an authorization check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Identity is neither owner nor listed.
    NoAccess,
    /// Identity is listed below the required level.
    Insufficient { actual: Visibility },
}

/// Grant input that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantInputError {
    InvalidEmail(String),
    Empty,
}

/// Checks that `identity` holds at least `required` on `container`.
pub fn authorize(
    container: &Container,
    identity: &VerifiedIdentity,
    required: Visibility,
) -> Result<Visibility, Denial> {
    match container.visibility_for(identity) {
        None => Err(Denial::NoAccess),
        Some(actual) if actual < required => Err(Denial::Insufficient { actual }),
        Some(actual) => Ok(actual),
    }
}

/// Returns whether `identity` may extend access on `container`.
pub fn may_grant(container: &Container, identity: &VerifiedIdentity) -> bool {
    container.owner == identity.uid
}

/// Validates the explicit emails of a request.
pub fn normalize_request_emails(request: &GrantRequest) -> Result<BTreeSet<String>, GrantInputError> {
    request
        .emails()
        .iter()
        .map(|value| normalize_email(value).ok_or_else(|| GrantInputError::InvalidEmail(value.clone())))
        .collect()
}

/// Unions explicit emails with group members and builds the entries to append.
pub fn build_entries(
    mut emails: BTreeSet<String>,
    group: Option<&NamedGroup>,
    visibility: Visibility,
) -> Result<Vec<AccessEntry>, GrantInputError> {
    if let Some(group) = group {
        emails.extend(group.members.iter().cloned());
    }
    if emails.is_empty() {
        return Err(GrantInputError::Empty);
    }
    Ok(emails
        .into_iter()
        .map(|email| AccessEntry::new(email, visibility))
        .collect())
}
