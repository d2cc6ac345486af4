//! Named access group repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Groups are keyed by `(owner_uid, name)`.
//! - Membership rows are a set; re-adding a member is a no-op.

use crate::model::group::NamedGroup;
use crate::repo::{ensure_tables_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, ErrorCode, Transaction, TransactionBehavior};
use std::collections::BTreeSet;

/// Repository interface for named group operations.
pub trait GroupRepository {
    /// Creates one group; `Conflict` when the owner already has that name.
    fn create_group(&self, group: &NamedGroup) -> RepoResult<()>;
    /// Loads one owner-scoped group.
    fn get_group(&self, owner_uid: &str, name: &str) -> RepoResult<Option<NamedGroup>>;
    /// Adds members; returns how many were new.
    fn add_members(
        &self,
        owner_uid: &str,
        name: &str,
        members: &BTreeSet<String>,
    ) -> RepoResult<usize>;
    /// Lists an owner's groups sorted by name.
    fn list_groups(&self, owner_uid: &str) -> RepoResult<Vec<NamedGroup>>;
    /// Deletes one group and its membership.
    fn delete_group(&self, owner_uid: &str, name: &str) -> RepoResult<()>;
}

/// SQLite-backed group repository.
pub struct SqliteGroupRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGroupRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables_ready(
            conn,
            &[
                ("access_groups", &["owner_uid", "name"]),
                ("access_group_members", &["owner_uid", "group_name", "email"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl GroupRepository for SqliteGroupRepository<'_> {
    fn create_group(&self, group: &NamedGroup) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO access_groups (owner_uid, name) VALUES (?1, ?2);",
            params![group.owner, group.name],
        )
        .map_err(|err| match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                RepoError::Conflict(format!("group `{}`", group.name))
            }
            _ => err.into(),
        })?;
        insert_members(&tx, &group.owner, &group.name, &group.members)?;
        tx.commit()?;
        Ok(())
    }

    fn get_group(&self, owner_uid: &str, name: &str) -> RepoResult<Option<NamedGroup>> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM access_groups WHERE owner_uid = ?1 AND name = ?2
            );",
            params![owner_uid, name],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(None);
        }
        Ok(Some(NamedGroup {
            owner: owner_uid.to_string(),
            name: name.to_string(),
            members: load_members(self.conn, owner_uid, name)?,
        }))
    }

    fn add_members(
        &self,
        owner_uid: &str,
        name: &str,
        members: &BTreeSet<String>,
    ) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let exists: i64 = tx.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM access_groups WHERE owner_uid = ?1 AND name = ?2
            );",
            params![owner_uid, name],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepoError::NotFound(format!("group `{name}`")));
        }
        let added = insert_members(&tx, owner_uid, name, members)?;
        tx.commit()?;
        Ok(added)
    }

    fn list_groups(&self, owner_uid: &str) -> RepoResult<Vec<NamedGroup>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM access_groups WHERE owner_uid = ?1 ORDER BY name ASC;",
        )?;
        let names = stmt
            .query_map([owner_uid], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        names
            .into_iter()
            .map(|name| -> RepoResult<NamedGroup> {
                Ok(NamedGroup {
                    owner: owner_uid.to_string(),
                    members: load_members(self.conn, owner_uid, &name)?,
                    name,
                })
            })
            .collect()
    }

    fn delete_group(&self, owner_uid: &str, name: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM access_groups WHERE owner_uid = ?1 AND name = ?2;",
            params![owner_uid, name],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("group `{name}`")));
        }
        Ok(())
    }
}

fn insert_members(
    conn: &Connection,
    owner_uid: &str,
    name: &str,
    members: &BTreeSet<String>,
) -> RepoResult<usize> {
    let mut added = 0;
    for email in members {
        added += conn.execute(
            "INSERT OR IGNORE INTO access_group_members (owner_uid, group_name, email)
             VALUES (?1, ?2, ?3);",
            params![owner_uid, name, email],
        )?;
    }
    Ok(added)
}

fn load_members(conn: &Connection, owner_uid: &str, name: &str) -> RepoResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT email FROM access_group_members
         WHERE owner_uid = ?1 AND group_name = ?2;",
    )?;
    let emails = stmt.query_map(params![owner_uid, name], |row| row.get(0))?;
    Ok(emails.collect::<Result<_, _>>()?)
}
