//! Keybinding configuration for the TUI.
//!
//! The title and URL inputs consume printable keys as text, so only the
//! focus, submit and Ctrl-modified quit bindings reach them.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::Deserialize;

use crate::tui::event::Action;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeybindingConfig {
    pub quit: Vec<String>,
    pub move_up: Vec<String>,
    pub move_down: Vec<String>,
    pub next_focus: Vec<String>,
    pub prev_focus: Vec<String>,
    pub submit: Vec<String>,
    pub delete_bookmark: Vec<String>,
    pub open_in_browser: Vec<String>,
    pub refresh: Vec<String>,
    pub sign_in: Vec<String>,
    pub sign_out: Vec<String>,
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

impl Default for KeybindingConfig {
    fn default() -> Self {
        Self {
            quit: keys(&["q", "Ctrl+c"]),
            move_up: keys(&["k", "Up"]),
            move_down: keys(&["j", "Down"]),
            next_focus: keys(&["Tab"]),
            prev_focus: keys(&["BackTab", "Shift+Tab"]),
            submit: keys(&["Enter"]),
            delete_bookmark: keys(&["d", "Delete"]),
            open_in_browser: keys(&["o"]),
            refresh: keys(&["R"]),
            sign_in: keys(&["s"]),
            sign_out: keys(&["L"]),
        }
    }
}

impl KeybindingConfig {
    pub fn get_action(&self, key: &KeyEvent) -> Action {
        let table: [(&[String], Action); 11] = [
            (self.quit.as_slice(), Action::Quit),
            (self.move_up.as_slice(), Action::MoveUp),
            (self.move_down.as_slice(), Action::MoveDown),
            (self.next_focus.as_slice(), Action::NextFocus),
            (self.prev_focus.as_slice(), Action::PrevFocus),
            (self.submit.as_slice(), Action::Submit),
            (self.delete_bookmark.as_slice(), Action::DeleteBookmark),
            (self.open_in_browser.as_slice(), Action::OpenInBrowser),
            (self.refresh.as_slice(), Action::Refresh),
            (self.sign_in.as_slice(), Action::SignIn),
            (self.sign_out.as_slice(), Action::SignOut),
        ];
        table
            .iter()
            .find(|(bindings, _)| matches_any(key, bindings))
            .map(|(_, action)| *action)
            .unwrap_or(Action::None)
    }
}

fn matches_any(key: &KeyEvent, bindings: &[String]) -> bool {
    bindings
        .iter()
        .filter_map(|binding| parse_key_string(binding).ok())
        .any(|parsed| parsed.matches(key))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    /// Shift is ignored when the binding doesn't ask for it, since terminals
    /// report `R` as Shift+R.
    pub fn matches(&self, key: &KeyEvent) -> bool {
        self.code == key.code
            && (self.modifiers == key.modifiers
                || self.modifiers == (key.modifiers & !KeyModifiers::SHIFT))
    }
}

/// Parse strings such as `"j"`, `"Enter"`, `"Ctrl+c"` or `"Shift+Tab"`.
pub fn parse_key_string(s: &str) -> Result<KeyBinding, String> {
    let s = s.trim();
    let mut parts: Vec<&str> = s.split('+').collect();
    // "+" on its own, or a trailing "Ctrl++", means the plus key.
    if s.ends_with("++") || s == "+" {
        parts.truncate(parts.len().saturating_sub(2));
        parts.push("+");
    }
    let key_part = parts.pop().ok_or_else(|| format!("Empty key: {}", s))?;

    let mut modifiers = KeyModifiers::NONE;
    for part in parts {
        modifiers |= match part.to_lowercase().as_str() {
            "ctrl" | "control" => KeyModifiers::CONTROL,
            "shift" => KeyModifiers::SHIFT,
            "alt" => KeyModifiers::ALT,
            _ => return Err(format!("Unknown modifier: {}", part)),
        };
    }

    Ok(KeyBinding {
        code: parse_key_code(key_part)?,
        modifiers,
    })
}

fn parse_key_code(s: &str) -> Result<KeyCode, String> {
    let mut chars = s.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(KeyCode::Char(c));
    }

    let lower = s.to_lowercase();
    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
        if (1..=12).contains(&n) {
            return Ok(KeyCode::F(n));
        }
    }

    let code = match lower.as_str() {
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "backtab" => KeyCode::BackTab,
        "backspace" | "bs" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" | "pgup" => KeyCode::PageUp,
        "pagedown" | "pgdn" => KeyCode::PageDown,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "esc" | "escape" => KeyCode::Esc,
        "space" => KeyCode::Char(' '),
        _ => return Err(format!("Unknown key: {}", s)),
    };
    Ok(code)
}
