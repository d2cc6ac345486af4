//! Leaf item (note) model.
//!
//! Note content is opaque to the container core; only the id, the owning
//! folder and the addressed path matter for cascading deletion.

use crate::model::container::ContainerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable note identifier.
pub type NoteId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: NoteId,
    pub folder_id: ContainerId,
    /// Path of the containing folder at creation time.
    pub path: String,
    pub owner: String,
    pub content: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl NoteRecord {
    /// Creates a note record with a generated id, addressed under `folder_path`.
    pub fn new(
        folder_id: impl Into<ContainerId>,
        folder_path: impl Into<String>,
        owner: impl Into<String>,
        content: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            folder_id: folder_id.into(),
            path: folder_path.into(),
            owner: owner.into(),
            content: content.into(),
            created_at,
        }
    }
}
