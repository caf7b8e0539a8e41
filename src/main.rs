use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smartmarks::app::AppContext;
use smartmarks::cli::{commands, Cli, Commands};
use smartmarks::config::Config;

const DEFAULT_LOG_FILTER: &str = "smartmarks=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command();

    // The TUI owns the terminal, so its logs go to a file.
    init_tracing(command == Commands::Tui)?;

    let mut config = Config::load(cli.config.as_deref())?;
    config
        .backend
        .apply_overrides(cli.url.clone(), cli.anon_key.clone());
    let ctx = AppContext::new(&config.backend)?;
    let backend = &ctx.backend;
    let provider = config.backend.provider.as_str();

    match command {
        Commands::Tui => {
            smartmarks::tui::run(&ctx, &config).await?;
        }
        Commands::Login => {
            commands::login(backend, provider).await?;
        }
        Commands::Logout => {
            commands::logout(backend, provider).await?;
        }
        Commands::Whoami => {
            commands::whoami(backend).await?;
        }
        Commands::List => {
            commands::list(backend, provider).await?;
        }
        Commands::Add { title, url } => {
            commands::add(backend, provider, &title, &url).await?;
        }
        Commands::Remove { id } => {
            commands::remove(backend, provider, &id).await?;
        }
        Commands::Watch => {
            let _refresh = ctx.auth.spawn_refresh_task();
            commands::watch(backend, provider).await?;
        }
    }

    Ok(())
}

fn init_tracing(to_file: bool) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if to_file {
        let path = log_path()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
    Ok(())
}

fn log_path() -> anyhow::Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("could not find data directory")?
        .join("smartmarks");
    fs::create_dir_all(&dir)?;
    Ok(dir.join("smartmarks.log"))
}
