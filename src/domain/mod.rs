pub mod bookmark;
pub mod change;
pub mod identity;

pub use bookmark::{sort_newest_first, Bookmark, NewBookmark};
pub use change::{ChangeEvent, ChangeKind};
pub use identity::{Identity, Session};
