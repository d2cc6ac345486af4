//! Container (folder) domain model.
//!
//! # Responsibility
//! - Define the folder record, its access list (`xlist`) and read projections.
//! - Compute effective visibility for one identity.
//!
//! # Invariants
//! - `owner` is immutable and always has `Visibility::Write`.
//! - `xlist` is ordered and append-only; duplicate emails may accumulate.

use crate::model::identity::VerifiedIdentity;
use serde::{Deserialize, Serialize};

/// Content-derived container identifier (64 lowercase hex chars).
pub type ContainerId = String;

/// Access level carried by one access entry.
///
/// Ordered so that `Write > Read`. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Visibility {
    /// View-only access.
    Read,
    /// Full access, including deletion.
    Write,
}

impl Visibility {
    /// Stable numeric code persisted in `container_access.visibility`.
    pub fn code(self) -> i64 {
        match self {
            Self::Read => 0,
            Self::Write => 1,
        }
    }

    /// Parses a persisted numeric code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            _ => None,
        }
    }
}

impl From<Visibility> for i64 {
    fn from(value: Visibility) -> Self {
        value.code()
    }
}

impl TryFrom<i64> for Visibility {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_code(value).ok_or_else(|| format!("unknown visibility code `{value}`"))
    }
}

/// One `xlist` entry granting an identity email access to a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessEntry {
    /// Normalized (trimmed, lowercase) email.
    pub email: String,
    pub visibility: Visibility,
}

impl AccessEntry {
    pub fn new(email: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            email: email.into(),
            visibility,
        }
    }
}

/// Child collection selector for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    Folders,
    Notes,
}

impl ChildKind {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Folders => "folder",
            Self::Notes => "note",
        }
    }
}

/// Access-list filter for `list_access`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessFilter {
    All,
    Only(Visibility),
}

impl AccessFilter {
    pub fn matches(self, entry: &AccessEntry) -> bool {
        match self {
            Self::All => true,
            Self::Only(visibility) => entry.visibility == visibility,
        }
    }
}

/// Folder record as persisted by the container store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    /// Display name, no uniqueness among siblings.
    pub name: String,
    /// `None` for a per-user root container.
    pub parent_id: Option<ContainerId>,
    /// Owner uid.
    pub owner: String,
    /// Materialized path: ancestor ids joined by [`crate::model::path::PATH_SEPARATOR`].
    pub path: String,
    pub xlist: Vec<AccessEntry>,
    pub child_folder_ids: Vec<ContainerId>,
    pub child_note_ids: Vec<String>,
    /// Epoch nanoseconds captured when the id was derived.
    pub created_at: i64,
}

impl Container {
    /// Returns the effective visibility for `identity`, or `None` without access.
    ///
    /// The owner always gets `Write`. Otherwise the highest level among the
    /// entries matching the identity email wins, so accumulated duplicates
    /// never lower access.
    pub fn visibility_for(&self, identity: &VerifiedIdentity) -> Option<Visibility> {
        if self.owner == identity.uid {
            return Some(Visibility::Write);
        }
        self.xlist
            .iter()
            .filter(|entry| entry.email == identity.email)
            .map(|entry| entry.visibility)
            .max()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Projects metadata for `identity`, if it has any access.
    pub fn meta_for(&self, identity: &VerifiedIdentity) -> Option<ContainerMeta> {
        self.visibility_for(identity).map(|visibility| ContainerMeta {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            visibility,
        })
    }
}

/// Metadata projection returned by `get_meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMeta {
    pub id: ContainerId,
    pub name: String,
    pub owner: String,
    /// Requester's effective visibility.
    pub visibility: Visibility,
}
