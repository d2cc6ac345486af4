//! Container tree repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist folders keyed by id with a unique index on materialized `path`.
//! - Run subtree queries and bulk updates through path-prefix matching.
//! - Record write-ahead markers for cascading deletes.
//!
//! # Invariants
//! - Subtree filter is the key range `P <= path < P%`, served by the unique
//!   path index; no LIKE/GLOB pattern is built from stored data.
//! - `xlist` rows are append-only and returned in insertion order.
//! - A child reference is only pushed when the parent row still exists.

use crate::model::container::{AccessEntry, ChildKind, Container, ContainerId, Visibility};
use crate::model::path::subtree_upper_bound;
use crate::repo::{ensure_tables_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior};

const CONTAINER_SELECT_SQL: &str = "SELECT
    id,
    name,
    parent_id,
    owner_uid,
    path,
    created_at
FROM containers";

/// Binds `?1 = path`, `?2 = subtree_upper_bound(path)`.
const SUBTREE_FILTER_SQL: &str = "(path >= ?1 AND path < ?2)";

/// Containers removed by phase one of a cascading delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeDeletion {
    /// Write-ahead marker id; cleared once the note phase completes.
    pub pending_id: i64,
    pub containers: Vec<Container>,
    /// Union of `child_note_ids` across the deleted containers.
    pub note_ids: Vec<String>,
}

/// Cascading delete whose note phase has not been confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub id: i64,
    pub target_id: ContainerId,
    pub path: String,
    pub containers_deleted: usize,
    pub note_ids: Vec<String>,
}

/// Repository interface for container tree operations.
pub trait ContainerRepository {
    /// Persists a non-root container and pushes it onto its parent's folder refs.
    fn insert_container(&self, container: &Container) -> RepoResult<()>;
    /// Persists a root container and registers it as the owner's root.
    fn register_root(&self, container: &Container) -> RepoResult<()>;
    /// Resolves the provisioned root of one owner.
    fn root_of(&self, owner_uid: &str) -> RepoResult<Option<ContainerId>>;
    /// Loads one container with its access list and child references.
    fn get_container(&self, id: &str) -> RepoResult<Option<Container>>;
    /// Lists child references of one kind in insertion order.
    fn list_child_ids(&self, id: &str, kind: ChildKind) -> RepoResult<Vec<String>>;
    /// Loads the container at `path` and all of its descendants, ordered by path.
    fn list_subtree(&self, path: &str) -> RepoResult<Vec<Container>>;
    /// Appends entries to a single container's access list.
    fn append_access(&self, id: &str, entries: &[AccessEntry]) -> RepoResult<usize>;
    /// Appends entries to every container under `path` owned by `owner_uid`.
    ///
    /// Returns the number of containers updated.
    fn append_access_to_subtree(
        &self,
        path: &str,
        owner_uid: &str,
        entries: &[AccessEntry],
    ) -> RepoResult<usize>;
    /// Pushes a note reference onto a folder.
    fn push_child_note(&self, folder_id: &str, note_id: &str) -> RepoResult<()>;
    /// Deletes the subtree rooted at `target` and leaves a pending-delete marker.
    fn delete_subtree(&self, target: &Container) -> RepoResult<SubtreeDeletion>;
    /// Lists markers of cascading deletes still waiting on their note phase.
    fn pending_deletes(&self) -> RepoResult<Vec<PendingDelete>>;
    /// Removes one pending-delete marker.
    fn clear_pending_delete(&self, pending_id: i64) -> RepoResult<()>;
}

/// SQLite-backed container repository.
pub struct SqliteContainerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContainerRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables_ready(
            conn,
            &[
                (
                    "containers",
                    &["id", "name", "parent_id", "owner_uid", "path", "created_at"],
                ),
                ("container_access", &["seq", "container_id", "email", "visibility"]),
                ("container_children", &["seq", "parent_id", "child_id", "kind"]),
                ("user_roots", &["owner_uid", "root_id"]),
                ("pending_deletes", &["id", "target_id", "path", "containers_deleted"]),
                ("pending_delete_notes", &["pending_id", "note_id"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl ContainerRepository for SqliteContainerRepository<'_> {
    fn insert_container(&self, container: &Container) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_container_row(&tx, container)?;
        if let Some(parent_id) = container.parent_id.as_deref() {
            tx.execute(
                "INSERT INTO container_children (parent_id, child_id, kind)
                 SELECT ?1, ?2, 'folder'
                 WHERE EXISTS(SELECT 1 FROM containers WHERE id = ?1);",
                params![parent_id, container.id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn register_root(&self, container: &Container) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO user_roots (owner_uid, root_id) VALUES (?1, ?2);",
            params![container.owner, container.id],
        )
        .map_err(|err| conflict_or_db(err, format!("root already provisioned for {}", container.owner)))?;
        insert_container_row(&tx, container)?;
        tx.commit()?;
        Ok(())
    }

    fn root_of(&self, owner_uid: &str) -> RepoResult<Option<ContainerId>> {
        let root_id = self
            .conn
            .query_row(
                "SELECT root_id FROM user_roots WHERE owner_uid = ?1;",
                [owner_uid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(root_id)
    }

    fn get_container(&self, id: &str) -> RepoResult<Option<Container>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CONTAINER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => {
                let container = parse_container_row(row)?;
                Ok(Some(hydrate(self.conn, container)?))
            }
            None => Ok(None),
        }
    }

    fn list_child_ids(&self, id: &str, kind: ChildKind) -> RepoResult<Vec<String>> {
        load_child_ids(self.conn, id, kind)
    }

    fn list_subtree(&self, path: &str) -> RepoResult<Vec<Container>> {
        load_subtree(self.conn, path)
    }

    fn append_access(&self, id: &str, entries: &[AccessEntry]) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let exists: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM containers WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepoError::NotFound(format!("container {id}")));
        }
        for entry in entries {
            tx.execute(
                "INSERT INTO container_access (container_id, email, visibility)
                 VALUES (?1, ?2, ?3);",
                params![id, entry.email, entry.visibility.code()],
            )?;
        }
        tx.commit()?;
        Ok(1)
    }

    fn append_access_to_subtree(
        &self,
        path: &str,
        owner_uid: &str,
        entries: &[AccessEntry],
    ) -> RepoResult<usize> {
        let bound = subtree_upper_bound(path);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let matched: i64 = tx.query_row(
            &format!(
                "SELECT COUNT(*) FROM containers
                 WHERE owner_uid = ?3 AND {SUBTREE_FILTER_SQL};"
            ),
            params![path, bound, owner_uid],
            |row| row.get(0),
        )?;
        for entry in entries {
            tx.execute(
                &format!(
                    "INSERT INTO container_access (container_id, email, visibility)
                     SELECT id, ?4, ?5
                     FROM containers
                     WHERE owner_uid = ?3 AND {SUBTREE_FILTER_SQL}
                     ORDER BY path ASC;"
                ),
                params![path, bound, owner_uid, entry.email, entry.visibility.code()],
            )?;
        }
        tx.commit()?;
        Ok(matched as usize)
    }

    fn push_child_note(&self, folder_id: &str, note_id: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "INSERT INTO container_children (parent_id, child_id, kind)
             SELECT ?1, ?2, 'note'
             WHERE EXISTS(SELECT 1 FROM containers WHERE id = ?1);",
            params![folder_id, note_id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("container {folder_id}")));
        }
        Ok(())
    }

    fn delete_subtree(&self, target: &Container) -> RepoResult<SubtreeDeletion> {
        let bound = subtree_upper_bound(&target.path);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let containers = load_subtree(&tx, &target.path)?;
        if containers.is_empty() {
            return Err(RepoError::NotFound(format!("container {}", target.id)));
        }
        let note_ids: Vec<String> = containers
            .iter()
            .flat_map(|container| container.child_note_ids.iter().cloned())
            .collect();

        tx.execute(
            "INSERT INTO pending_deletes (target_id, path, containers_deleted)
             VALUES (?1, ?2, ?3);",
            params![target.id, target.path, containers.len() as i64],
        )?;
        let pending_id = tx.last_insert_rowid();
        for note_id in &note_ids {
            tx.execute(
                "INSERT OR IGNORE INTO pending_delete_notes (pending_id, note_id)
                 VALUES (?1, ?2);",
                params![pending_id, note_id],
            )?;
        }

        tx.execute(
            "DELETE FROM container_children WHERE kind = 'folder' AND child_id = ?1;",
            [target.id.as_str()],
        )?;
        tx.execute(
            &format!("DELETE FROM containers WHERE {SUBTREE_FILTER_SQL};"),
            params![target.path, bound],
        )?;
        tx.commit()?;

        Ok(SubtreeDeletion {
            pending_id,
            containers,
            note_ids,
        })
    }

    fn pending_deletes(&self) -> RepoResult<Vec<PendingDelete>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, path, containers_deleted
             FROM pending_deletes
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut pending = Vec::new();
        while let Some(row) = rows.next()? {
            let containers_deleted: i64 = row.get("containers_deleted")?;
            pending.push(PendingDelete {
                id: row.get("id")?,
                target_id: row.get("target_id")?,
                path: row.get("path")?,
                containers_deleted: containers_deleted as usize,
                note_ids: Vec::new(),
            });
        }

        for marker in &mut pending {
            let mut stmt = self.conn.prepare(
                "SELECT note_id FROM pending_delete_notes WHERE pending_id = ?1 ORDER BY note_id;",
            )?;
            let ids = stmt.query_map([marker.id], |row| row.get(0))?;
            marker.note_ids = ids.collect::<Result<_, _>>()?;
        }
        Ok(pending)
    }

    fn clear_pending_delete(&self, pending_id: i64) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM pending_deletes WHERE id = ?1;", [pending_id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("pending delete {pending_id}")));
        }
        Ok(())
    }
}

fn insert_container_row(conn: &Connection, container: &Container) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO containers (id, name, parent_id, owner_uid, path, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            container.id,
            container.name,
            container.parent_id,
            container.owner,
            container.path,
            container.created_at,
        ],
    )
    .map_err(|err| conflict_or_db(err, format!("container {}", container.id)))?;

    for entry in &container.xlist {
        conn.execute(
            "INSERT INTO container_access (container_id, email, visibility)
             VALUES (?1, ?2, ?3);",
            params![container.id, entry.email, entry.visibility.code()],
        )?;
    }
    Ok(())
}

fn load_subtree(conn: &Connection, path: &str) -> RepoResult<Vec<Container>> {
    let mut stmt = conn.prepare(&format!(
        "{CONTAINER_SELECT_SQL} WHERE {SUBTREE_FILTER_SQL} ORDER BY path ASC;"
    ))?;
    let mut rows = stmt.query(params![path, subtree_upper_bound(path)])?;
    let mut containers = Vec::new();
    while let Some(row) = rows.next()? {
        containers.push(parse_container_row(row)?);
    }
    containers
        .into_iter()
        .map(|container| hydrate(conn, container))
        .collect()
}

fn hydrate(conn: &Connection, mut container: Container) -> RepoResult<Container> {
    container.xlist = load_access(conn, &container.id)?;
    container.child_folder_ids = load_child_ids(conn, &container.id, ChildKind::Folders)?;
    container.child_note_ids = load_child_ids(conn, &container.id, ChildKind::Notes)?;
    Ok(container)
}

fn load_access(conn: &Connection, id: &str) -> RepoResult<Vec<AccessEntry>> {
    let mut stmt = conn.prepare(
        "SELECT email, visibility
         FROM container_access
         WHERE container_id = ?1
         ORDER BY seq ASC;",
    )?;
    let mut rows = stmt.query([id])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let code: i64 = row.get("visibility")?;
        let visibility = Visibility::from_code(code).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid visibility `{code}` in container_access.visibility"
            ))
        })?;
        entries.push(AccessEntry::new(row.get::<_, String>("email")?, visibility));
    }
    Ok(entries)
}

fn load_child_ids(conn: &Connection, id: &str, kind: ChildKind) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT child_id
         FROM container_children
         WHERE parent_id = ?1 AND kind = ?2
         ORDER BY seq ASC;",
    )?;
    let ids = stmt.query_map(params![id, kind.as_db()], |row| row.get(0))?;
    Ok(ids.collect::<Result<_, _>>()?)
}

fn parse_container_row(row: &Row<'_>) -> RepoResult<Container> {
    Ok(Container {
        id: row.get("id")?,
        name: row.get("name")?,
        parent_id: row.get("parent_id")?,
        owner: row.get("owner_uid")?,
        path: row.get("path")?,
        xlist: Vec::new(),
        child_folder_ids: Vec::new(),
        child_note_ids: Vec::new(),
        created_at: row.get("created_at")?,
    })
}

fn conflict_or_db(err: rusqlite::Error, what: String) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            RepoError::Conflict(what)
        }
        _ => err.into(),
    }
}
