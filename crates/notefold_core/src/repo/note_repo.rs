//! Leaf item (note) repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the note persistence needed for cascading folder deletes.
//! - Address notes by their own materialized `path` as a fallback sweep.
//!
//! # Invariants
//! - A note's `path` equals the path of its folder at creation time.
//! - Bulk deletes are idempotent: deleting an absent id is not an error.

use crate::model::note::{NoteId, NoteRecord};
use crate::model::path::subtree_upper_bound;
use crate::repo::{ensure_tables_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    folder_id,
    path,
    owner_uid,
    content,
    created_at
FROM notes";

/// Binds `?1 = path`, `?2 = subtree_upper_bound(path)`.
const NOTE_SUBTREE_FILTER_SQL: &str = "path >= ?1 AND path < ?2";

/// Repository interface for note operations.
pub trait NoteRepository {
    /// Inserts one note.
    fn create_note(&self, note: &NoteRecord) -> RepoResult<()>;
    /// Loads one note by id.
    fn get_note(&self, id: NoteId) -> RepoResult<Option<NoteRecord>>;
    /// Deletes notes by id; returns the number of rows removed.
    fn delete_notes(&self, ids: &[NoteId]) -> RepoResult<usize>;
    /// Deletes every note addressed at `path` or beneath it.
    fn delete_notes_under_path(&self, path: &str) -> RepoResult<usize>;
    /// Counts notes addressed at `path` or beneath it.
    fn count_notes_under_path(&self, path: &str) -> RepoResult<usize>;
}

/// SQLite-backed note repository.
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoteRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables_ready(
            conn,
            &[(
                "notes",
                &["id", "folder_id", "path", "owner_uid", "content", "created_at"],
            )],
        )?;
        Ok(Self { conn })
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn create_note(&self, note: &NoteRecord) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO notes (id, folder_id, path, owner_uid, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                note.id.to_string(),
                note.folder_id,
                note.path,
                note.owner,
                note.content,
                note.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_note(&self, id: NoteId) -> RepoResult<Option<NoteRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_note_row(row)?));
        }
        Ok(None)
    }

    fn delete_notes(&self, ids: &[NoteId]) -> RepoResult<usize> {
        let mut stmt = self.conn.prepare("DELETE FROM notes WHERE id = ?1;")?;
        let mut removed = 0;
        for id in ids {
            removed += stmt.execute([id.to_string()])?;
        }
        Ok(removed)
    }

    fn delete_notes_under_path(&self, path: &str) -> RepoResult<usize> {
        let removed = self.conn.execute(
            &format!("DELETE FROM notes WHERE {NOTE_SUBTREE_FILTER_SQL};"),
            params![path, subtree_upper_bound(path)],
        )?;
        Ok(removed)
    }

    fn count_notes_under_path(&self, path: &str) -> RepoResult<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM notes WHERE {NOTE_SUBTREE_FILTER_SQL};"),
            params![path, subtree_upper_bound(path)],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<NoteRecord> {
    let id_text: String = row.get("id")?;
    Ok(NoteRecord {
        id: parse_note_id(&id_text)?,
        folder_id: row.get("folder_id")?,
        path: row.get("path")?,
        owner: row.get("owner_uid")?,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
    })
}

/// Parses a stored note id.
pub fn parse_note_id(value: &str) -> RepoResult<NoteId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid note id `{value}`")))
}
