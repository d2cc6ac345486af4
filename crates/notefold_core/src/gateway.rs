//! Request gateway.
//!
//! # Responsibility
//! - Verify the caller's credential before any core operation runs.
//! - Wire SQLite repositories into services for one connection.
//! - Flatten service failures into one [`ErrorKind`] per request.
//!
//! # Invariants
//! - An unverifiable credential never reaches a service.
//! - Credentials and emails are never logged.

use crate::auth::{AuthError, IdentityProvider};
use crate::error::ErrorKind;
use crate::model::container::{AccessEntry, AccessFilter, ChildKind, Container, ContainerMeta, Visibility};
use crate::model::group::NamedGroup;
use crate::model::identity::VerifiedIdentity;
use crate::model::note::NoteRecord;
use crate::repo::container_repo::SqliteContainerRepository;
use crate::repo::group_repo::SqliteGroupRepository;
use crate::repo::note_repo::{parse_note_id, SqliteNoteRepository};
use crate::repo::RepoError;
use crate::service::access::{GrantRequest, GrantScope};
use crate::service::container_service::{
    ContainerService, ContainerServiceError, DeleteOutcome, GrantOutcome, ParentRef,
    RecoveryOutcome,
};
use crate::service::group_service::{GroupService, GroupServiceError};
use log::warn;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Request-level error.
#[derive(Debug)]
pub enum GatewayError {
    Auth(AuthError),
    /// Request body or identifier could not be parsed.
    InvalidRequest(String),
    Container(ContainerServiceError),
    Group(GroupServiceError),
    /// Repository wiring failed for this connection.
    Repo(RepoError),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::AuthenticationFailed,
            Self::InvalidRequest(_) => ErrorKind::ValidationError,
            Self::Container(err) => err.kind(),
            Self::Group(err) => err.kind(),
            Self::Repo(_) => ErrorKind::StorageError,
        }
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{err}"),
            Self::InvalidRequest(details) => write!(f, "invalid request: {details}"),
            Self::Container(err) => write!(f, "{err}"),
            Self::Group(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            Self::InvalidRequest(_) => None,
            Self::Container(err) => Some(err),
            Self::Group(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<ContainerServiceError> for GatewayError {
    fn from(value: ContainerServiceError) -> Self {
        Self::Container(value)
    }
}

impl From<GroupServiceError> for GatewayError {
    fn from(value: GroupServiceError) -> Self {
        Self::Group(value)
    }
}

impl From<RepoError> for GatewayError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

type SqliteContainerService<'conn> = ContainerService<
    SqliteContainerRepository<'conn>,
    SqliteNoteRepository<'conn>,
    SqliteGroupRepository<'conn>,
>;

/// Authenticated entry point over one migrated connection.
pub struct CoreGateway<'conn, P: IdentityProvider> {
    conn: &'conn Connection,
    provider: P,
}

impl<'conn, P: IdentityProvider> CoreGateway<'conn, P> {
    pub fn new(conn: &'conn Connection, provider: P) -> Self {
        Self { conn, provider }
    }

    pub fn provision_root(&self, credential: &str) -> GatewayResult<Container> {
        let identity = self.verify(credential)?;
        Ok(self.containers()?.provision_root(&identity)?)
    }

    pub fn create_container(
        &self,
        credential: &str,
        parent: &ParentRef,
        name: &str,
    ) -> GatewayResult<Container> {
        let identity = self.verify(credential)?;
        Ok(self.containers()?.create_container(parent, name, &identity)?)
    }

    pub fn get_meta(&self, credential: &str, id: &str) -> GatewayResult<ContainerMeta> {
        let identity = self.verify(credential)?;
        Ok(self.containers()?.get_meta(id, &identity)?)
    }

    pub fn list_children(
        &self,
        credential: &str,
        id: &str,
        kind: ChildKind,
    ) -> GatewayResult<Vec<String>> {
        let identity = self.verify(credential)?;
        Ok(self.containers()?.list_children(id, kind, &identity)?)
    }

    pub fn list_access(
        &self,
        credential: &str,
        id: &str,
        filter: AccessFilter,
    ) -> GatewayResult<Vec<AccessEntry>> {
        let identity = self.verify(credential)?;
        Ok(self.containers()?.list_access(id, filter, &identity)?)
    }

    pub fn grant_access(
        &self,
        credential: &str,
        id: &str,
        visibility: Visibility,
        request: &GrantRequest,
        scope: GrantScope,
    ) -> GatewayResult<GrantOutcome> {
        let identity = self.verify(credential)?;
        Ok(self
            .containers()?
            .grant_access(id, visibility, request, scope, &identity)?)
    }

    /// Same as [`Self::grant_access`] with a JSON-encoded [`GrantRequest`].
    pub fn grant_access_json(
        &self,
        credential: &str,
        id: &str,
        visibility: Visibility,
        request_json: &str,
        scope: GrantScope,
    ) -> GatewayResult<GrantOutcome> {
        let identity = self.verify(credential)?;
        let request: GrantRequest = serde_json::from_str(request_json)
            .map_err(|err| GatewayError::InvalidRequest(format!("grant payload: {err}")))?;
        Ok(self
            .containers()?
            .grant_access(id, visibility, &request, scope, &identity)?)
    }

    pub fn delete_container(&self, credential: &str, id: &str) -> GatewayResult<DeleteOutcome> {
        let identity = self.verify(credential)?;
        Ok(self.containers()?.delete_container(id, &identity)?)
    }

    /// Replays interrupted deletes. Any verified identity may trigger it.
    pub fn recover_pending_deletes(&self, credential: &str) -> GatewayResult<RecoveryOutcome> {
        self.verify(credential)?;
        Ok(self.containers()?.recover_pending_deletes()?)
    }

    pub fn create_note(
        &self,
        credential: &str,
        folder_id: &str,
        content: &str,
    ) -> GatewayResult<NoteRecord> {
        let identity = self.verify(credential)?;
        Ok(self.containers()?.create_note(folder_id, content, &identity)?)
    }

    pub fn get_note(&self, credential: &str, note_id: &str) -> GatewayResult<NoteRecord> {
        let identity = self.verify(credential)?;
        let note_id = parse_note_id(note_id.trim())
            .map_err(|_| GatewayError::InvalidRequest(format!("note id `{note_id}`")))?;
        Ok(self.containers()?.get_note(note_id, &identity)?)
    }

    pub fn create_group(
        &self,
        credential: &str,
        name: &str,
        members: &[String],
    ) -> GatewayResult<NamedGroup> {
        let identity = self.verify(credential)?;
        Ok(self.groups()?.create_group(&identity, name, members)?)
    }

    pub fn add_group_members(
        &self,
        credential: &str,
        name: &str,
        members: &[String],
    ) -> GatewayResult<usize> {
        let identity = self.verify(credential)?;
        Ok(self.groups()?.add_members(&identity, name, members)?)
    }

    pub fn get_group(&self, credential: &str, name: &str) -> GatewayResult<NamedGroup> {
        let identity = self.verify(credential)?;
        Ok(self.groups()?.get_group(&identity, name)?)
    }

    pub fn list_groups(&self, credential: &str) -> GatewayResult<Vec<NamedGroup>> {
        let identity = self.verify(credential)?;
        Ok(self.groups()?.list_groups(&identity)?)
    }

    pub fn delete_group(&self, credential: &str, name: &str) -> GatewayResult<()> {
        let identity = self.verify(credential)?;
        Ok(self.groups()?.delete_group(&identity, name)?)
    }

    fn verify(&self, credential: &str) -> GatewayResult<VerifiedIdentity> {
        self.provider.verify(credential).map_err(|err| {
            warn!("event=auth_verify module=gateway status=error error_kind=authentication_failed");
            GatewayError::Auth(err)
        })
    }

    fn containers(&self) -> GatewayResult<SqliteContainerService<'conn>> {
        Ok(ContainerService::new(
            SqliteContainerRepository::try_new(self.conn)?,
            SqliteNoteRepository::try_new(self.conn)?,
            SqliteGroupRepository::try_new(self.conn)?,
        ))
    }

    fn groups(&self) -> GatewayResult<GroupService<SqliteGroupRepository<'conn>>> {
        Ok(GroupService::new(SqliteGroupRepository::try_new(self.conn)?))
    }
}
