use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored bookmark row. Ids and timestamps are assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

impl NewBookmark {
    /// Build an insert payload, rejecting blank fields.
    ///
    /// Fields are checked after trimming but stored exactly as given.
    pub fn validated(title: &str, url: &str, user_id: &str) -> Option<Self> {
        if title.trim().is_empty() || url.trim().is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            url: url.to_string(),
            user_id: user_id.to_string(),
        })
    }
}

/// Sort newest first, the order every list is displayed in.
pub fn sort_newest_first(bookmarks: &mut [Bookmark]) {
    bookmarks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
