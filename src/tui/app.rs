use ratatui::widgets::ListState;

use crate::domain::Bookmark;

/// Which part of the signed-in screen receives keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Title,
    Url,
    List,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Title => Focus::Url,
            Focus::Url => Focus::List,
            Focus::List => Focus::Title,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Focus::Title => Focus::List,
            Focus::Url => Focus::Title,
            Focus::List => Focus::Url,
        }
    }

    pub fn is_input(self) -> bool {
        matches!(self, Focus::Title | Focus::Url)
    }
}

pub struct TuiApp {
    pub focus: Focus,
    pub selected: usize,
    pub list_state: ListState,
    pub should_quit: bool,
    pub status_message: Option<String>,
    // Pending delete confirmation (bookmark id, title)
    pub pending_delete: Option<(String, String)>,
}

impl TuiApp {
    pub fn new() -> Self {
        Self {
            focus: Focus::Title,
            selected: 0,
            list_state: ListState::default(),
            should_quit: false,
            status_message: None,
            pending_delete: None,
        }
    }

    pub fn selected_bookmark<'a>(&self, bookmarks: &'a [Bookmark]) -> Option<&'a Bookmark> {
        bookmarks.get(self.selected)
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self, len: usize) {
        if self.selected + 1 < len {
            self.selected += 1;
        }
    }

    /// Keep the selection inside a list that may have shrunk or grown.
    pub fn sync_selection(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
            self.list_state.select(None);
        } else {
            self.selected = self.selected.min(len - 1);
            self.list_state.select(Some(self.selected));
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    pub fn clear_status(&mut self) {
        self.status_message = None;
    }
}

impl Default for TuiApp {
    fn default() -> Self {
        Self::new()
    }
}
