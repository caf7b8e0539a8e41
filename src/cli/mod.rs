pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "smartmarks")]
#[command(about = "Personal bookmarks synced through Supabase", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/smartmarks/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Supabase project URL, overriding the config file
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Supabase anon key, overriding the config file
    #[arg(long, global = true)]
    pub anon_key: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Tui)
    }
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Launch the TUI (default)
    Tui,
    /// Sign in through the browser
    Login,
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List bookmarks, newest first
    List,
    /// Add a bookmark
    Add {
        /// Bookmark title
        title: String,
        /// Bookmark URL
        url: String,
    },
    /// Remove a bookmark by id
    Remove {
        /// Id shown by `list`
        id: String,
    },
    /// Print the list again after every change until Ctrl+c
    Watch,
}
