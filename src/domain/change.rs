use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification from the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    pub record_id: Option<String>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, table: impl Into<String>, record_id: Option<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            record_id,
        }
    }
}
