//! # Smartmarks
//!
//! A terminal bookmark manager backed by a Supabase project.
//!
//! ## Architecture
//!
//! ```text
//! AuthProvider ─┐
//! BookmarkTable ─┼─► BookmarkView ─► TUI / CLI
//! ChangeFeed ───┘
//! ```
//!
//! - [`backend`]: Supabase auth (OAuth + PKCE), PostgREST table and Realtime feed
//! - [`view`]: identity state machine, list/create/delete, live re-listing
//! - [`tui`]: Terminal user interface built with ratatui
//!
//! ## Quick Start
//!
//! ```bash
//! export SUPABASE_URL=https://<project>.supabase.co
//! export SUPABASE_ANON_KEY=<anon key>
//!
//! # Sign in through the browser
//! smartmarks login
//!
//! # Add and list bookmarks
//! smartmarks add "Rust" https://www.rust-lang.org
//! smartmarks list
//!
//! # Launch TUI
//! smartmarks
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires the Supabase
/// collaborators together from the backend config.
pub mod app;

/// Hosted implementations of the three collaborators.
///
/// - [`SupabaseAuth`](backend::auth::SupabaseAuth): GoTrue sessions with refresh
/// - [`RestTable`](backend::rest::RestTable): PostgREST select/insert/delete
/// - [`RealtimeFeed`](backend::realtime::RealtimeFeed): Phoenix channel change feed
///
/// Tests run against an in-process `MemoryBackend` with the same contract.
pub mod backend;

/// Command-line interface using clap.
///
/// - `tui` (default), `login`, `logout`, `whoami`
/// - `list`, `add <title> <url>`, `remove <id>`, `watch`
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/smartmarks/config.toml`, supporting:
/// - The Supabase project (`[backend]`)
/// - Custom colors (named or hex)
/// - Custom keybindings
pub mod config;

/// Core domain models.
///
/// - [`Bookmark`](domain::Bookmark) and [`NewBookmark`](domain::NewBookmark)
/// - [`Identity`](domain::Identity) and [`Session`](domain::Session)
/// - [`ChangeEvent`](domain::ChangeEvent)
pub mod domain;

/// Terminal user interface.
///
/// Signed-out prompt, or a form above the bookmark list.
/// Keybindings: Tab cycles focus, Enter adds, d deletes, o opens,
/// R refreshes, L signs out, q quits.
pub mod tui;

/// The bookmark screen's state and operations.
pub mod view;
