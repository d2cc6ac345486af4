//! Container tree use-case service.
//!
//! # Responsibility
//! - Create containers under a resolved parent with a snapshot of its xlist.
//! - Serve metadata, child listings and access listings behind authorization.
//! - Propagate grants through a subtree and run two-phase cascading deletes.
//!
//! # Invariants
//! - Not-found, authorization and validation failures are raised before any
//!   write reaches the store.
//! - Every creation attempt derives its id from a fresh timestamp.
//! - A cascading delete never reports success while its pending-delete
//!   marker survives.

use crate::error::ErrorKind;
use crate::model::container::{
    AccessEntry, AccessFilter, ChildKind, Container, ContainerId, ContainerMeta, Visibility,
};
use crate::model::group::normalize_group_name;
use crate::model::identity::VerifiedIdentity;
use crate::model::note::{NoteId, NoteRecord};
use crate::model::path::{
    build_path, derive_id, is_valid_container_id, next_creation_timestamp, now_nanos,
    CreationAttrs,
};
use crate::repo::container_repo::{ContainerRepository, PendingDelete};
use crate::repo::group_repo::GroupRepository;
use crate::repo::note_repo::{parse_note_id, NoteRepository};
use crate::repo::RepoError;
use crate::service::access::{
    authorize, build_entries, may_grant, normalize_request_emails, Denial, GrantInputError,
    GrantRequest, GrantScope,
};
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const ROOT_CONTAINER_NAME: &str = "root";
const ROOT_SENTINEL: &str = "root";
const MAX_CREATE_ATTEMPTS: usize = 3;

/// Parent selector for container creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// The requester's provisioned root container.
    Root,
    Id(ContainerId),
}

impl ParentRef {
    /// Parses user input; the literal `root` selects the personal root.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            ROOT_SENTINEL => Self::Root,
            other => Self::Id(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GrantOutcome {
    pub containers_updated: usize,
    pub entries_appended: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub containers_deleted: usize,
    pub notes_deleted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    pub markers_completed: usize,
    pub notes_deleted: usize,
}

/// Errors from container service operations.
#[derive(Debug)]
pub enum ContainerServiceError {
    /// Container is absent, malformed, or hidden from the requester.
    ContainerNotFound(ContainerId),
    /// Requester has no provisioned root.
    RootNotProvisioned(String),
    /// Named group referenced by a grant does not exist for the owner.
    GroupNotFound(String),
    NoteNotFound(NoteId),
    /// Requester is known to the container but lacks the required level.
    AccessDenied {
        container_id: ContainerId,
        required: Visibility,
    },
    /// Container name is blank after trim.
    InvalidName,
    /// Provisioned roots are permanent.
    RootNotDeletable(ContainerId),
    InvalidGroupName,
    /// Grant email is not email-shaped.
    InvalidEmail(String),
    /// Grant resolved to no emails.
    EmptyGrant,
    /// Containers were deleted but the note phase did not complete.
    PartialFailure {
        pending_id: i64,
        containers_deleted: usize,
        notes_pending: usize,
        source: RepoError,
    },
    /// Repository-level failure.
    Repo(RepoError),
}

impl ContainerServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContainerNotFound(_)
            | Self::RootNotProvisioned(_)
            | Self::GroupNotFound(_)
            | Self::NoteNotFound(_) => ErrorKind::NotFound,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::InvalidName
            | Self::RootNotDeletable(_)
            | Self::InvalidGroupName
            | Self::InvalidEmail(_)
            | Self::EmptyGrant => ErrorKind::ValidationError,
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
            Self::Repo(_) => ErrorKind::StorageError,
        }
    }
}

impl Display for ContainerServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContainerNotFound(id) => write!(f, "container not found: {id}"),
            Self::RootNotProvisioned(uid) => write!(f, "no root container provisioned for {uid}"),
            Self::GroupNotFound(name) => write!(f, "access group not found: {name}"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::AccessDenied {
                container_id,
                required,
            } => write!(
                f,
                "access denied: {required:?} visibility required on {container_id}"
            ),
            Self::InvalidName => write!(f, "container name must not be blank"),
            Self::RootNotDeletable(id) => write!(f, "root container cannot be deleted: {id}"),
            Self::InvalidGroupName => write!(f, "group name must not be blank"),
            Self::InvalidEmail(value) => write!(f, "invalid email: `{value}`"),
            Self::EmptyGrant => write!(f, "grant resolves to no emails"),
            Self::PartialFailure {
                pending_id,
                containers_deleted,
                notes_pending,
                source,
            } => write!(
                f,
                "partial delete: {containers_deleted} containers removed, {notes_pending} notes pending (marker {pending_id}): {source}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ContainerServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PartialFailure { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ContainerServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<GrantInputError> for ContainerServiceError {
    fn from(value: GrantInputError) -> Self {
        match value {
            GrantInputError::InvalidEmail(email) => Self::InvalidEmail(email),
            GrantInputError::Empty => Self::EmptyGrant,
        }
    }
}

type ServiceResult<T> = Result<T, ContainerServiceError>;

/// Container tree service facade.
pub struct ContainerService<C, N, G>
where
    C: ContainerRepository,
    N: NoteRepository,
    G: GroupRepository,
{
    containers: C,
    notes: N,
    groups: G,
}

impl<C, N, G> ContainerService<C, N, G>
where
    C: ContainerRepository,
    N: NoteRepository,
    G: GroupRepository,
{
    /// Creates service from repository implementations.
    pub fn new(containers: C, notes: N, groups: G) -> Self {
        Self {
            containers,
            notes,
            groups,
        }
    }

    /// Creates the requester's root container once; later calls return it.
    pub fn provision_root(&self, identity: &VerifiedIdentity) -> ServiceResult<Container> {
        let started_at = Instant::now();
        let result = self.provision_root_inner(identity);
        log_result("root_provision", started_at, &result);
        result
    }

    /// Creates one folder under `parent`, inheriting its xlist by value.
    pub fn create_container(
        &self,
        parent: &ParentRef,
        name: &str,
        requester: &VerifiedIdentity,
    ) -> ServiceResult<Container> {
        let started_at = Instant::now();
        let result = self.create_container_inner(parent, name, requester);
        log_result("container_create", started_at, &result);
        result
    }

    /// Returns `{id, name, owner, visibility}` for the requester.
    pub fn get_meta(&self, id: &str, requester: &VerifiedIdentity) -> ServiceResult<ContainerMeta> {
        let container = self.load(id)?;
        container
            .meta_for(requester)
            .ok_or_else(|| ContainerServiceError::AccessDenied {
                container_id: container.id.clone(),
                required: Visibility::Read,
            })
    }

    /// Lists child folder or note ids in insertion order.
    pub fn list_children(
        &self,
        id: &str,
        kind: ChildKind,
        requester: &VerifiedIdentity,
    ) -> ServiceResult<Vec<String>> {
        let container = self.load_authorized(id, requester, Visibility::Read)?;
        Ok(self.containers.list_child_ids(&container.id, kind)?)
    }

    /// Lists the container's xlist entries matching `filter`.
    pub fn list_access(
        &self,
        id: &str,
        filter: AccessFilter,
        requester: &VerifiedIdentity,
    ) -> ServiceResult<Vec<AccessEntry>> {
        let container = self.load_authorized(id, requester, Visibility::Read)?;
        Ok(container
            .xlist
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect())
    }

    /// Appends `visibility` entries for the resolved emails.
    ///
    /// Only the owner may grant. With `GrantScope::Subtree` every container
    /// under the target's path that the owner owns receives the entries;
    /// children created while the grant runs may miss it.
    pub fn grant_access(
        &self,
        id: &str,
        visibility: Visibility,
        request: &GrantRequest,
        scope: GrantScope,
        requester: &VerifiedIdentity,
    ) -> ServiceResult<GrantOutcome> {
        let started_at = Instant::now();
        let result = self.grant_access_inner(id, visibility, request, scope, requester);
        log_result("access_grant", started_at, &result);
        result
    }

    /// Deletes the container, all descendants and every note addressed under it.
    pub fn delete_container(
        &self,
        id: &str,
        requester: &VerifiedIdentity,
    ) -> ServiceResult<DeleteOutcome> {
        let started_at = Instant::now();
        let result = self.delete_container_inner(id, requester);
        log_result("container_delete", started_at, &result);
        result
    }

    /// Completes the note phase of every interrupted cascading delete.
    pub fn recover_pending_deletes(&self) -> ServiceResult<RecoveryOutcome> {
        let started_at = Instant::now();
        let mut outcome = RecoveryOutcome::default();
        for marker in self.containers.pending_deletes()? {
            let notes_deleted = self
                .finish_note_phase(&marker)
                .map_err(|source| partial_failure(&marker, source))?;
            outcome.markers_completed += 1;
            outcome.notes_deleted += notes_deleted;
        }
        info!(
            "event=delete_recover module=container status=ok markers_completed={} notes_deleted={} duration_ms={}",
            outcome.markers_completed,
            outcome.notes_deleted,
            started_at.elapsed().as_millis()
        );
        Ok(outcome)
    }

    /// Lists cascading deletes whose note phase is still outstanding.
    pub fn pending_deletes(&self) -> ServiceResult<Vec<PendingDelete>> {
        Ok(self.containers.pending_deletes()?)
    }

    /// Creates one note in a folder the requester can write.
    pub fn create_note(
        &self,
        folder_id: &str,
        content: &str,
        requester: &VerifiedIdentity,
    ) -> ServiceResult<NoteRecord> {
        let folder = self.load(folder_id)?;
        require(&folder, requester, Visibility::Write)?;

        let note = NoteRecord::new(
            folder.id.as_str(),
            folder.path.as_str(),
            folder.owner.as_str(),
            content,
            now_nanos() / 1_000_000,
        );
        self.notes.create_note(&note)?;
        if let Err(err) = self
            .containers
            .push_child_note(&folder.id, &note.id.to_string())
        {
            if let Err(cleanup) = self.notes.delete_notes(&[note.id]) {
                warn!("event=note_create module=container status=error error_code=cleanup_failed error={cleanup}");
            }
            return Err(missing_container(err, &folder.id));
        }
        Ok(note)
    }

    /// Loads one note if the requester can read its folder.
    pub fn get_note(&self, id: NoteId, requester: &VerifiedIdentity) -> ServiceResult<NoteRecord> {
        let note = self
            .notes
            .get_note(id)?
            .ok_or(ContainerServiceError::NoteNotFound(id))?;
        let folder = self
            .containers
            .get_container(&note.folder_id)?
            .ok_or(ContainerServiceError::NoteNotFound(id))?;
        if folder.visibility_for(requester).is_none() {
            return Err(ContainerServiceError::NoteNotFound(id));
        }
        Ok(note)
    }

    fn provision_root_inner(&self, identity: &VerifiedIdentity) -> ServiceResult<Container> {
        if let Some(root) = self.existing_root(&identity.uid)? {
            return Ok(root);
        }

        let created_at = next_creation_timestamp();
        let id = derive_id(&CreationAttrs {
            name: ROOT_CONTAINER_NAME,
            parent_id: "",
            owner: &identity.uid,
            timestamp_ns: created_at,
        });
        let root = Container {
            path: build_path(None, &id),
            id,
            name: ROOT_CONTAINER_NAME.to_string(),
            parent_id: None,
            owner: identity.uid.clone(),
            xlist: Vec::new(),
            child_folder_ids: Vec::new(),
            child_note_ids: Vec::new(),
            created_at,
        };

        match self.containers.register_root(&root) {
            Ok(()) => Ok(root),
            // Lost a provisioning race; the winner's root is authoritative.
            Err(RepoError::Conflict(_)) => self
                .existing_root(&identity.uid)?
                .ok_or_else(|| ContainerServiceError::RootNotProvisioned(identity.uid.clone())),
            Err(err) => Err(err.into()),
        }
    }

    fn create_container_inner(
        &self,
        parent: &ParentRef,
        name: &str,
        requester: &VerifiedIdentity,
    ) -> ServiceResult<Container> {
        let name = normalize_name(name)?;
        let parent = match parent {
            ParentRef::Root => {
                let root_id = self
                    .containers
                    .root_of(&requester.uid)?
                    .ok_or_else(|| ContainerServiceError::RootNotProvisioned(requester.uid.clone()))?;
                self.load(&root_id)?
            }
            ParentRef::Id(id) => self.load(id)?,
        };
        require(&parent, requester, Visibility::Write)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let created_at = next_creation_timestamp();
            let id = derive_id(&CreationAttrs {
                name: &name,
                parent_id: &parent.id,
                owner: &parent.owner,
                timestamp_ns: created_at,
            });
            let container = Container {
                path: build_path(Some(&parent.path), &id),
                id,
                name: name.clone(),
                parent_id: Some(parent.id.clone()),
                owner: parent.owner.clone(),
                xlist: parent.xlist.clone(),
                child_folder_ids: Vec::new(),
                child_note_ids: Vec::new(),
                created_at,
            };

            match self.containers.insert_container(&container) {
                Ok(()) => return Ok(container),
                Err(RepoError::Conflict(_)) if attempt < MAX_CREATE_ATTEMPTS => {
                    warn!("event=container_create module=container status=retry attempt={attempt} error_code=id_collision");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn grant_access_inner(
        &self,
        id: &str,
        visibility: Visibility,
        request: &GrantRequest,
        scope: GrantScope,
        requester: &VerifiedIdentity,
    ) -> ServiceResult<GrantOutcome> {
        let emails = normalize_request_emails(request)?;
        let group_name = request
            .group_name()
            .map(|name| normalize_group_name(name).ok_or(ContainerServiceError::InvalidGroupName))
            .transpose()?;

        let target = self.load(id)?;
        if !may_grant(&target, requester) {
            return Err(match target.visibility_for(requester) {
                None => ContainerServiceError::ContainerNotFound(target.id),
                Some(_) => ContainerServiceError::AccessDenied {
                    container_id: target.id,
                    required: Visibility::Write,
                },
            });
        }

        let group = match group_name {
            Some(name) => Some(
                self.groups
                    .get_group(&target.owner, &name)?
                    .ok_or(ContainerServiceError::GroupNotFound(name))?,
            ),
            None => None,
        };
        let entries = build_entries(emails, group.as_ref(), visibility)?;

        let containers_updated = match scope {
            GrantScope::Subtree => {
                self.containers
                    .append_access_to_subtree(&target.path, &target.owner, &entries)?
            }
            GrantScope::ContainerOnly => self
                .containers
                .append_access(&target.id, &entries)
                .map_err(|err| missing_container(err, &target.id))?,
        };

        Ok(GrantOutcome {
            containers_updated,
            entries_appended: containers_updated * entries.len(),
        })
    }

    fn delete_container_inner(
        &self,
        id: &str,
        requester: &VerifiedIdentity,
    ) -> ServiceResult<DeleteOutcome> {
        let target = self.load_authorized(id, requester, Visibility::Write)?;
        if target.is_root() {
            return Err(ContainerServiceError::RootNotDeletable(target.id));
        }

        let deletion = self
            .containers
            .delete_subtree(&target)
            .map_err(|err| missing_container(err, &target.id))?;
        let marker = PendingDelete {
            id: deletion.pending_id,
            target_id: target.id.clone(),
            path: target.path.clone(),
            containers_deleted: deletion.containers.len(),
            note_ids: deletion.note_ids,
        };

        let notes_deleted = self
            .finish_note_phase(&marker)
            .map_err(|source| partial_failure(&marker, source))?;
        Ok(DeleteOutcome {
            containers_deleted: marker.containers_deleted,
            notes_deleted,
        })
    }

    /// Phase two: notes by forward reference, then a path sweep for strays.
    fn finish_note_phase(&self, marker: &PendingDelete) -> Result<usize, RepoError> {
        let ids: Vec<NoteId> = marker
            .note_ids
            .iter()
            .filter_map(|raw| match parse_note_id(raw) {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!("event=container_delete module=container status=skip pending_id={} error={err}", marker.id);
                    None
                }
            })
            .collect();

        let mut removed = self.notes.delete_notes(&ids)?;
        removed += self.notes.delete_notes_under_path(&marker.path)?;
        match self.containers.clear_pending_delete(marker.id) {
            // A concurrent recovery pass already finished this marker.
            Ok(()) | Err(RepoError::NotFound(_)) => Ok(removed),
            Err(err) => Err(err),
        }
    }

    fn existing_root(&self, uid: &str) -> ServiceResult<Option<Container>> {
        match self.containers.root_of(uid)? {
            Some(root_id) => Ok(self.containers.get_container(&root_id)?),
            None => Ok(None),
        }
    }

    fn load(&self, id: &str) -> ServiceResult<Container> {
        if !is_valid_container_id(id) {
            return Err(ContainerServiceError::ContainerNotFound(id.to_string()));
        }
        self.containers
            .get_container(id)?
            .ok_or_else(|| ContainerServiceError::ContainerNotFound(id.to_string()))
    }

    /// Loads `id` for a caller that must hold `required`; any shortfall is
    /// `AccessDenied`, only an absent container is `NotFound`.
    fn load_authorized(
        &self,
        id: &str,
        requester: &VerifiedIdentity,
        required: Visibility,
    ) -> ServiceResult<Container> {
        let container = self.load(id)?;
        if authorize(&container, requester, required).is_err() {
            return Err(ContainerServiceError::AccessDenied {
                container_id: container.id,
                required,
            });
        }
        Ok(container)
    }
}

/// Write precondition: unknown requesters see `NotFound`, listed readers
/// see `AccessDenied`.
fn require(
    container: &Container,
    requester: &VerifiedIdentity,
    required: Visibility,
) -> ServiceResult<()> {
    match authorize(container, requester, required) {
        Ok(_) => Ok(()),
        Err(Denial::NoAccess) => Err(ContainerServiceError::ContainerNotFound(
            container.id.clone(),
        )),
        Err(Denial::Insufficient { .. }) => Err(ContainerServiceError::AccessDenied {
            container_id: container.id.clone(),
            required,
        }),
    }
}

fn normalize_name(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ContainerServiceError::InvalidName);
    }
    Ok(trimmed.to_string())
}

fn missing_container(err: RepoError, id: &str) -> ContainerServiceError {
    match err {
        RepoError::NotFound(_) => ContainerServiceError::ContainerNotFound(id.to_string()),
        other => ContainerServiceError::Repo(other),
    }
}

fn partial_failure(marker: &PendingDelete, source: RepoError) -> ContainerServiceError {
    ContainerServiceError::PartialFailure {
        pending_id: marker.id,
        containers_deleted: marker.containers_deleted,
        notes_pending: marker.note_ids.len(),
        source,
    }
}

fn log_result<T>(event: &str, started_at: Instant, result: &ServiceResult<T>) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!("event={event} module=container status=ok duration_ms={duration_ms}"),
        Err(err) => warn!(
            "event={event} module=container status=error duration_ms={duration_ms} error_kind={}",
            err.kind()
        ),
    }
}
