use notefold_core::db::open_db_in_memory;
use notefold_core::model::path::{build_path, derive_id, CreationAttrs};
use notefold_core::repo::container_repo::{ContainerRepository, SqliteContainerRepository};
use notefold_core::repo::group_repo::SqliteGroupRepository;
use notefold_core::repo::note_repo::SqliteNoteRepository;
use notefold_core::{
    AccessEntry, AccessFilter, Container, ContainerService, ContainerServiceError, ErrorKind,
    GrantRequest, GrantScope, GroupService, ParentRef, VerifiedIdentity, Visibility,
};
use rusqlite::Connection;

type Service<'conn> = ContainerService<
    SqliteContainerRepository<'conn>,
    SqliteNoteRepository<'conn>,
    SqliteGroupRepository<'conn>,
>;

struct Tree {
    root: Container,
    a: Container,
    b: Container,
}

#[test]
fn subtree_grant_reaches_every_descendant_but_not_ancestors() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);

    let outcome = service
        .grant_access(
            &tree.a.id,
            Visibility::Read,
            &GrantRequest::explicit(["carol@example.com"]),
            GrantScope::Subtree,
            &alice(),
        )
        .unwrap();

    assert_eq!(outcome.containers_updated, 2);
    assert_eq!(outcome.entries_appended, 2);
    let carol = carol();
    assert_eq!(
        service.get_meta(&tree.a.id, &carol).unwrap().visibility,
        Visibility::Read
    );
    assert_eq!(
        service.get_meta(&tree.b.id, &carol).unwrap().visibility,
        Visibility::Read
    );
    assert_eq!(
        service.get_meta(&tree.root.id, &carol).unwrap_err().kind(),
        ErrorKind::AccessDenied
    );
}

#[test]
fn container_only_grant_leaves_existing_children_on_their_snapshot() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();

    let outcome = service
        .grant_access(
            &tree.a.id,
            Visibility::Write,
            &GrantRequest::explicit(["carol@example.com"]),
            GrantScope::ContainerOnly,
            &alice,
        )
        .unwrap();
    assert_eq!(outcome.containers_updated, 1);

    assert!(access(&service, &tree.b.id).is_empty());
    let later = service
        .create_container(&ParentRef::Id(tree.a.id.clone()), "later", &alice)
        .unwrap();
    assert_eq!(
        access(&service, &later.id),
        vec![AccessEntry::new("carol@example.com", Visibility::Write)]
    );
}

#[test]
fn grant_skips_descendants_owned_by_someone_else() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);

    let repo = SqliteContainerRepository::try_new(&conn).unwrap();
    let foreign = foreign_child(&tree.b, "uid-mallory");
    repo.insert_container(&foreign).unwrap();

    let outcome = service
        .grant_access(
            &tree.a.id,
            Visibility::Read,
            &GrantRequest::explicit(["carol@example.com"]),
            GrantScope::Subtree,
            &alice(),
        )
        .unwrap();

    assert_eq!(outcome.containers_updated, 2);
    let stored = repo.get_container(&foreign.id).unwrap().unwrap();
    assert!(stored.xlist.is_empty());
}

#[test]
fn repeated_grants_accumulate_and_highest_level_wins() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();

    for visibility in [Visibility::Read, Visibility::Write, Visibility::Read] {
        service
            .grant_access(
                &tree.a.id,
                visibility,
                &GrantRequest::explicit(["carol@example.com"]),
                GrantScope::Subtree,
                &alice,
            )
            .unwrap();
    }

    assert_eq!(
        access(&service, &tree.b.id),
        vec![
            AccessEntry::new("carol@example.com", Visibility::Read),
            AccessEntry::new("carol@example.com", Visibility::Write),
            AccessEntry::new("carol@example.com", Visibility::Read),
        ]
    );
    assert_eq!(
        service.get_meta(&tree.b.id, &carol()).unwrap().visibility,
        Visibility::Write
    );
}

#[test]
fn list_access_filters_by_visibility() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();

    service
        .grant_access(
            &tree.a.id,
            Visibility::Read,
            &GrantRequest::explicit(["carol@example.com"]),
            GrantScope::Subtree,
            &alice,
        )
        .unwrap();
    service
        .grant_access(
            &tree.a.id,
            Visibility::Write,
            &GrantRequest::explicit(["dave@example.com"]),
            GrantScope::Subtree,
            &alice,
        )
        .unwrap();

    let writers = service
        .list_access(&tree.a.id, AccessFilter::Only(Visibility::Write), &alice)
        .unwrap();
    assert_eq!(
        writers,
        vec![AccessEntry::new("dave@example.com", Visibility::Write)]
    );
    let readers = service
        .list_access(&tree.a.id, AccessFilter::Only(Visibility::Read), &carol())
        .unwrap();
    assert_eq!(readers.len(), 1);
}

#[test]
fn only_owner_may_grant() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();
    service
        .grant_access(
            &tree.a.id,
            Visibility::Write,
            &GrantRequest::explicit(["carol@example.com"]),
            GrantScope::Subtree,
            &alice,
        )
        .unwrap();

    let writer = service
        .grant_access(
            &tree.a.id,
            Visibility::Write,
            &GrantRequest::explicit(["eve@example.com"]),
            GrantScope::Subtree,
            &carol(),
        )
        .unwrap_err();
    assert_eq!(writer.kind(), ErrorKind::AccessDenied);

    let stranger = VerifiedIdentity::new("uid-eve", "eve@example.com");
    let hidden = service
        .grant_access(
            &tree.a.id,
            Visibility::Write,
            &GrantRequest::explicit(["eve@example.com"]),
            GrantScope::Subtree,
            &stranger,
        )
        .unwrap_err();
    assert_eq!(hidden.kind(), ErrorKind::NotFound);
    assert_eq!(access(&service, &tree.a.id).len(), 1);
}

#[test]
fn invalid_or_empty_grants_leave_store_untouched() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);
    let alice = alice();

    let invalid = service
        .grant_access(
            &tree.a.id,
            Visibility::Read,
            &GrantRequest::explicit(["carol@example.com", "not-an-email"]),
            GrantScope::Subtree,
            &alice,
        )
        .unwrap_err();
    assert!(matches!(invalid, ContainerServiceError::InvalidEmail(ref value) if value == "not-an-email"));
    assert_eq!(invalid.kind(), ErrorKind::ValidationError);

    let empty = service
        .grant_access(
            &tree.a.id,
            Visibility::Read,
            &GrantRequest::explicit(Vec::<String>::new()),
            GrantScope::Subtree,
            &alice,
        )
        .unwrap_err();
    assert!(matches!(empty, ContainerServiceError::EmptyGrant));

    assert!(access(&service, &tree.a.id).is_empty());
    assert!(access(&service, &tree.b.id).is_empty());
}

#[test]
fn grouped_grant_unions_group_members() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let groups = GroupService::new(SqliteGroupRepository::try_new(&conn).unwrap());
    let tree = build_tree(&service);
    let alice = alice();

    groups
        .create_group(
            &alice,
            "reviewers",
            &["Dave@Example.com".to_string(), "carol@example.com".to_string()],
        )
        .unwrap();

    let outcome = service
        .grant_access(
            &tree.a.id,
            Visibility::Read,
            &GrantRequest::grouped(["carol@example.com", "erin@example.com"], "reviewers"),
            GrantScope::Subtree,
            &alice,
        )
        .unwrap();

    assert_eq!(outcome.containers_updated, 2);
    assert_eq!(outcome.entries_appended, 6);
    let emails: Vec<String> = access(&service, &tree.b.id)
        .into_iter()
        .map(|entry| entry.email)
        .collect();
    assert_eq!(
        emails,
        vec!["carol@example.com", "dave@example.com", "erin@example.com"]
    );
}

#[test]
fn grouped_grant_with_unknown_group_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tree = build_tree(&service);

    let err = service
        .grant_access(
            &tree.a.id,
            Visibility::Read,
            &GrantRequest::grouped(["carol@example.com"], "ghosts"),
            GrantScope::Subtree,
            &alice(),
        )
        .unwrap_err();
    assert!(matches!(err, ContainerServiceError::GroupNotFound(ref name) if name == "ghosts"));
    assert!(access(&service, &tree.a.id).is_empty());
}

#[test]
fn groups_are_scoped_to_their_owner() {
    let conn = open_db_in_memory().unwrap();
    let groups = GroupService::new(SqliteGroupRepository::try_new(&conn).unwrap());
    let alice = alice();
    let carol = carol();

    groups
        .create_group(&carol, "team", &["dave@example.com".to_string()])
        .unwrap();
    groups
        .create_group(&alice, "team", &["erin@example.com".to_string()])
        .unwrap();

    let duplicate = groups.create_group(&alice, " team ", &[]).unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::ValidationError);

    assert_eq!(groups.add_members(&alice, "team", &["frank@example.com".to_string(), "erin@example.com".to_string()]).unwrap(), 1);
    let team = groups.get_group(&alice, "team").unwrap();
    assert_eq!(team.members.len(), 2);
    assert_eq!(groups.list_groups(&carol).unwrap().len(), 1);

    groups.delete_group(&alice, "team").unwrap();
    assert_eq!(
        groups.get_group(&alice, "team").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert!(groups.get_group(&carol, "team").is_ok());
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
    Tree { root, a, b }
}

fn foreign_child(parent: &Container, owner: &str) -> Container {
    let created_at = parent.created_at + 1;
    let id = derive_id(&CreationAttrs {
        name: "foreign",
        parent_id: &parent.id,
        owner,
        timestamp_ns: created_at,
    });
    Container {
        path: build_path(Some(&parent.path), &id),
        id,
        name: "foreign".to_string(),
        parent_id: Some(parent.id.clone()),
        owner: owner.to_string(),
        xlist: Vec::new(),
        child_folder_ids: Vec::new(),
        child_note_ids: Vec::new(),
        created_at,
    }
}

fn access(service: &Service<'_>, id: &str) -> Vec<AccessEntry> {
    service.list_access(id, AccessFilter::All, &alice()).unwrap()
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

fn carol() -> VerifiedIdentity {
    VerifiedIdentity::new("uid-carol", "carol@example.com")
}
