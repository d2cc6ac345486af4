use notefold_core::db::open_db_in_memory;
use notefold_core::model::note::{NoteId, NoteRecord};
use notefold_core::repo::container_repo::{ContainerRepository, SqliteContainerRepository};
use notefold_core::repo::group_repo::SqliteGroupRepository;
use notefold_core::repo::note_repo::{NoteRepository, SqliteNoteRepository};
use notefold_core::{
    ChildKind, Container, ContainerService, ContainerServiceError, ErrorKind, GrantRequest,
    GrantScope, ParentRef, RepoError, RepoResult, VerifiedIdentity, Visibility,
};
use rusqlite::Connection;

type Service<'conn> = ContainerService<
    SqliteContainerRepository<'conn>,
    SqliteNoteRepository<'conn>,
    SqliteGroupRepository<'conn>,
>;

/// Delegates everything except deletes, which always fail.
struct FailingDeletes<'conn> {
    inner: SqliteNoteRepository<'conn>,
}

impl NoteRepository for FailingDeletes<'_> {
    fn create_note(&self, note: &NoteRecord) -> RepoResult<()> {
        self.inner.create_note(note)
    }

    fn get_note(&self, id: NoteId) -> RepoResult<Option<NoteRecord>> {
        self.inner.get_note(id)
    }

    fn delete_notes(&self, _ids: &[NoteId]) -> RepoResult<usize> {
        Err(RepoError::InvalidData("injected note store outage".to_string()))
    }

    fn delete_notes_under_path(&self, _path: &str) -> RepoResult<usize> {
        Err(RepoError::InvalidData("injected note store outage".to_string()))
    }

    fn count_notes_under_path(&self, path: &str) -> RepoResult<usize> {
        self.inner.count_notes_under_path(path)
    }
}

/// Runs a recovery pass in the middle of the note phase, so the marker is
/// gone before the deleting request clears it.
struct RecoverDuringSweep<'conn> {
    conn: &'conn Connection,
    inner: SqliteNoteRepository<'conn>,
}

impl NoteRepository for RecoverDuringSweep<'_> {
    fn create_note(&self, note: &NoteRecord) -> RepoResult<()> {
        self.inner.create_note(note)
    }

    fn get_note(&self, id: NoteId) -> RepoResult<Option<NoteRecord>> {
        self.inner.get_note(id)
    }

    fn delete_notes(&self, ids: &[NoteId]) -> RepoResult<usize> {
        self.inner.delete_notes(ids)
    }

    fn delete_notes_under_path(&self, path: &str) -> RepoResult<usize> {
        let recovered = service(self.conn).recover_pending_deletes().unwrap();
        assert_eq!(recovered.markers_completed, 1);
        self.inner.delete_notes_under_path(path)
    }

    fn count_notes_under_path(&self, path: &str) -> RepoResult<usize> {
        self.inner.count_notes_under_path(path)
    }
}

struct Tree {
    root: Container,
    a: Container,
    b: Container,
    sibling: Container,
}

#[test]
fn delete_removes_subtree_and_its_notes() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();

    let in_a = service.create_note(&tree.a.id, "alpha", &alice).unwrap();
    let in_b = service.create_note(&tree.b.id, "beta", &alice).unwrap();
    let in_sibling = service
        .create_note(&tree.sibling.id, "gamma", &alice)
        .unwrap();

    let outcome = service.delete_container(&tree.a.id, &alice).unwrap();
    assert_eq!(outcome.containers_deleted, 2);
    assert_eq!(outcome.notes_deleted, 2);

    for id in [&tree.a.id, &tree.b.id] {
        let err = service.get_meta(id, &alice).unwrap_err();
        assert!(matches!(err, ContainerServiceError::ContainerNotFound(_)));
    }
    for note in [&in_a, &in_b] {
        assert_eq!(
            service.get_note(note.id, &alice).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
    assert_eq!(service.get_note(in_sibling.id, &alice).unwrap().content, "gamma");
    assert_eq!(
        service
            .list_children(&tree.root.id, ChildKind::Folders, &alice)
            .unwrap(),
        vec![tree.sibling.id.clone()]
    );
    assert!(service.pending_deletes().unwrap().is_empty());

    let notes = SqliteNoteRepository::try_new(&conn).unwrap();
    assert_eq!(notes.count_notes_under_path(&tree.a.path).unwrap(), 0);
    assert_eq!(notes.count_notes_under_path(&tree.root.path).unwrap(), 1);
}

#[test]
fn delete_sweeps_unreferenced_notes_by_path() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();
    service.create_note(&tree.b.id, "linked", &alice).unwrap();

    let notes = SqliteNoteRepository::try_new(&conn).unwrap();
    let stray = NoteRecord::new(
        tree.b.id.as_str(),
        tree.b.path.as_str(),
        "uid-alice",
        "stray",
        0,
    );
    notes.create_note(&stray).unwrap();

    let outcome = service.delete_container(&tree.a.id, &alice).unwrap();
    assert_eq!(outcome.notes_deleted, 2);
    assert!(notes.get_note(stray.id).unwrap().is_none());
}

#[test]
fn writer_may_delete_but_reader_may_not() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();
    service
        .grant_access(
            &tree.b.id,
            Visibility::Read,
            &GrantRequest::explicit(["bob@example.com"]),
            GrantScope::ContainerOnly,
            &alice,
        )
        .unwrap();
    service
        .grant_access(
            &tree.sibling.id,
            Visibility::Write,
            &GrantRequest::explicit(["bob@example.com"]),
            GrantScope::ContainerOnly,
            &alice,
        )
        .unwrap();

    let bob = VerifiedIdentity::new("uid-bob", "bob@example.com");
    let denied = service.delete_container(&tree.b.id, &bob).unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::AccessDenied);
    assert!(service.get_meta(&tree.b.id, &alice).is_ok());

    let unlisted = service.delete_container(&tree.a.id, &bob).unwrap_err();
    assert_eq!(unlisted.kind(), ErrorKind::AccessDenied);
    assert!(service.get_meta(&tree.a.id, &alice).is_ok());

    let outcome = service.delete_container(&tree.sibling.id, &bob).unwrap();
    assert_eq!(outcome.containers_deleted, 1);
}

#[test]
fn provisioned_root_cannot_be_deleted() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();

    let err = service.delete_container(&tree.root.id, &alice).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert_eq!(
        service.provision_root(&alice).unwrap().id,
        tree.root.id
    );
}

#[test]
fn deleting_missing_container_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();

    service.delete_container(&tree.b.id, &alice).unwrap();
    let err = service.delete_container(&tree.b.id, &alice).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn note_phase_failure_is_partial_and_recoverable() {
    let conn = open_db_in_memory().unwrap();
    let healthy = service(&conn);
    let tree = build_tree(&healthy);
    let alice = alice();
    healthy.create_note(&tree.a.id, "alpha", &alice).unwrap();
    healthy.create_note(&tree.b.id, "beta", &alice).unwrap();

    let failing = ContainerService::new(
        SqliteContainerRepository::try_new(&conn).unwrap(),
        FailingDeletes {
            inner: SqliteNoteRepository::try_new(&conn).unwrap(),
        },
        SqliteGroupRepository::try_new(&conn).unwrap(),
    );
    let err = failing.delete_container(&tree.a.id, &alice).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialFailure);
    match &err {
        ContainerServiceError::PartialFailure {
            containers_deleted,
            notes_pending,
            ..
        } => {
            assert_eq!(*containers_deleted, 2);
            assert_eq!(*notes_pending, 2);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        healthy.get_meta(&tree.a.id, &alice).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    let pending = healthy.pending_deletes().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].target_id, tree.a.id);
    assert_eq!(pending[0].note_ids.len(), 2);

    let notes = SqliteNoteRepository::try_new(&conn).unwrap();
    assert_eq!(notes.count_notes_under_path(&tree.a.path).unwrap(), 2);

    let recovered = healthy.recover_pending_deletes().unwrap();
    assert_eq!(recovered.markers_completed, 1);
    assert_eq!(recovered.notes_deleted, 2);
    assert_eq!(notes.count_notes_under_path(&tree.a.path).unwrap(), 0);
    assert!(healthy.pending_deletes().unwrap().is_empty());

    let again = healthy.recover_pending_deletes().unwrap();
    assert_eq!(again.markers_completed, 0);
}

#[test]
fn delete_succeeds_when_concurrent_recovery_clears_marker_first() {
    let conn = open_db_in_memory().unwrap();
    let healthy = service(&conn);
    let tree = build_tree(&healthy);
    let alice = alice();
    healthy.create_note(&tree.a.id, "alpha", &alice).unwrap();
    healthy.create_note(&tree.b.id, "beta", &alice).unwrap();

    let racing = ContainerService::new(
        SqliteContainerRepository::try_new(&conn).unwrap(),
        RecoverDuringSweep {
            conn: &conn,
            inner: SqliteNoteRepository::try_new(&conn).unwrap(),
        },
        SqliteGroupRepository::try_new(&conn).unwrap(),
    );
    let outcome = racing.delete_container(&tree.a.id, &alice).unwrap();
    assert_eq!(outcome.containers_deleted, 2);
    assert_eq!(outcome.notes_deleted, 2);

    let notes = SqliteNoteRepository::try_new(&conn).unwrap();
    assert_eq!(notes.count_notes_under_path(&tree.a.path).unwrap(), 0);
    assert!(healthy.pending_deletes().unwrap().is_empty());
}

#[test]
fn note_creation_needs_write_on_folder() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();
    service
        .grant_access(
            &tree.a.id,
            Visibility::Read,
            &GrantRequest::explicit(["bob@example.com"]),
            GrantScope::Subtree,
            &alice,
        )
        .unwrap();
    let bob = VerifiedIdentity::new("uid-bob", "bob@example.com");

    let err = service.create_note(&tree.b.id, "nope", &bob).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);

    let note = service.create_note(&tree.b.id, "hello", &alice).unwrap();
    assert_eq!(note.path, tree.b.path);
    assert_eq!(note.owner, "uid-alice");
    assert_eq!(service.get_note(note.id, &bob).unwrap().content, "hello");
    assert_eq!(
        service
            .list_children(&tree.b.id, ChildKind::Notes, &bob)
            .unwrap(),
        vec![note.id.to_string()]
    );
}

#[test]
fn subtree_listing_excludes_siblings() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);

    let repo = SqliteContainerRepository::try_new(&conn).unwrap();
    let ids: Vec<String> = repo
        .list_subtree(&tree.a.path)
        .unwrap()
        .into_iter()
        .map(|container| container.id)
        .collect();
    assert_eq!(ids, vec![tree.a.id.clone(), tree.b.id.clone()]);
    assert!(!ids.contains(&tree.sibling.id));
}

fn build_tree(service: &Service<'_>) -> Tree {
    let alice = alice();
    let root = service.provision_root(&alice).unwrap();
    let a = service
        .create_container(&ParentRef::Root, "a", &alice)
        .unwrap();
    let b = service
        .create_container(&ParentRef::Id(a.id.clone()), "b", &alice)
        .unwrap();
    let sibling = service
        .create_container(&ParentRef::Root, "sibling", &alice)
        .unwrap();
    Tree {
        root,
        a,
        b,
        sibling,
    }
}

fn service(conn: &Connection) -> Service<'_> {
    ContainerService::new(
        SqliteContainerRepository::try_new(conn).unwrap(),
        SqliteNoteRepository::try_new(conn).unwrap(),
        SqliteGroupRepository::try_new(conn).unwrap(),
    )
}

fn alice() -> VerifiedIdentity {
    VerifiedIdentity::new("uid-alice", "alice@example.com")
}
