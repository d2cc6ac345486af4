//! Named access group use-case service.
//!
//! # Responsibility
//! - Create, extend, list and delete owner-scoped email groups.
//!
//! # Invariants
//! - Group names are trimmed and non-blank; member emails are lowercased.
//! - A group is only ever visible to its owner.

use crate::error::ErrorKind;
use crate::model::group::{normalize_emails, normalize_group_name, NamedGroup};
use crate::model::identity::VerifiedIdentity;
use crate::repo::group_repo::GroupRepository;
use crate::repo::RepoError;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from group service operations.
#[derive(Debug)]
pub enum GroupServiceError {
    InvalidGroupName,
    InvalidEmail(String),
    GroupExists(String),
    GroupNotFound(String),
    Repo(RepoError),
}

impl GroupServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGroupName | Self::InvalidEmail(_) | Self::GroupExists(_) => {
                ErrorKind::ValidationError
            }
            Self::GroupNotFound(_) => ErrorKind::NotFound,
            Self::Repo(_) => ErrorKind::StorageError,
        }
    }
}

impl Display for GroupServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGroupName => write!(f, "group name must not be blank"),
            Self::InvalidEmail(value) => write!(f, "invalid email: `{value}`"),
            Self::GroupExists(name) => write!(f, "access group already exists: {name}"),
            Self::GroupNotFound(name) => write!(f, "access group not found: {name}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GroupServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for GroupServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

type GroupResult<T> = Result<T, GroupServiceError>;

/// Group service facade.
pub struct GroupService<G: GroupRepository> {
    repo: G,
}

impl<G: GroupRepository> GroupService<G> {
    pub fn new(repo: G) -> Self {
        Self { repo }
    }

    /// Creates a group owned by `owner` with the given initial members.
    pub fn create_group(
        &self,
        owner: &VerifiedIdentity,
        name: &str,
        members: &[String],
    ) -> GroupResult<NamedGroup> {
        let name = normalize_group_name(name).ok_or(GroupServiceError::InvalidGroupName)?;
        let members = normalize_emails(members).map_err(GroupServiceError::InvalidEmail)?;
        let group = NamedGroup {
            owner: owner.uid.clone(),
            name,
            members,
        };

        match self.repo.create_group(&group) {
            Ok(()) => {
                info!(
                    "event=group_create module=group status=ok members={}",
                    group.members.len()
                );
                Ok(group)
            }
            Err(RepoError::Conflict(_)) => {
                warn!("event=group_create module=group status=error error_code=group_exists");
                Err(GroupServiceError::GroupExists(group.name))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Adds members to an existing group; returns how many were new.
    pub fn add_members(
        &self,
        owner: &VerifiedIdentity,
        name: &str,
        members: &[String],
    ) -> GroupResult<usize> {
        let name = normalize_group_name(name).ok_or(GroupServiceError::InvalidGroupName)?;
        let members = normalize_emails(members).map_err(GroupServiceError::InvalidEmail)?;
        match self.repo.add_members(&owner.uid, &name, &members) {
            Ok(added) => {
                info!("event=group_add_members module=group status=ok added={added}");
                Ok(added)
            }
            Err(RepoError::NotFound(_)) => Err(GroupServiceError::GroupNotFound(name)),
            Err(err) => Err(err.into()),
        }
    }

    pub fn get_group(&self, owner: &VerifiedIdentity, name: &str) -> GroupResult<NamedGroup> {
        let name = normalize_group_name(name).ok_or(GroupServiceError::InvalidGroupName)?;
        self.repo
            .get_group(&owner.uid, &name)?
            .ok_or(GroupServiceError::GroupNotFound(name))
    }

    /// Lists the owner's groups sorted by name.
    pub fn list_groups(&self, owner: &VerifiedIdentity) -> GroupResult<Vec<NamedGroup>> {
        Ok(self.repo.list_groups(&owner.uid)?)
    }

    /// Deletes a group. Entries already granted through it stay in place.
    pub fn delete_group(&self, owner: &VerifiedIdentity, name: &str) -> GroupResult<()> {
        let name = normalize_group_name(name).ok_or(GroupServiceError::InvalidGroupName)?;
        match self.repo.delete_group(&owner.uid, &name) {
            Ok(()) => {
                info!("event=group_delete module=group status=ok");
                Ok(())
            }
            Err(RepoError::NotFound(_)) => Err(GroupServiceError::GroupNotFound(name)),
            Err(err) => Err(err.into()),
        }
    }
}
