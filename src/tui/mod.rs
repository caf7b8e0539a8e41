pub mod app;
pub mod event;
pub mod layout;

use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::info;

use crate::app::{AppContext, Result};
use crate::config::Config;
use crate::view::{BookmarkView, CreateOutcome};

use self::app::{Focus, TuiApp};
use self::event::{Action, AppEvent, EventHandler};

type Tui = Terminal<CrosstermBackend<Stdout>>;

const POLL_RATE: Duration = Duration::from_millis(100);

pub async fn run(ctx: &AppContext, config: &Config) -> Result<()> {
    let _refresh = ctx.auth.spawn_refresh_task();
    let mut view = BookmarkView::new(ctx.backend.clone(), config.backend.provider.clone());
    view.initialize().await;

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut view, config).await;
    view.teardown().await;
    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(terminal: &mut Tui, view: &mut BookmarkView, config: &Config) -> Result<()> {
    let mut tui_app = TuiApp::new();
    let mut events = EventHandler::new(POLL_RATE);

    loop {
        tui_app.sync_selection(view.bookmarks().len());
        terminal.draw(|frame| layout::render(frame, &mut tui_app, view, &config.colors))?;

        tokio::select! {
            event = events.next() => match event {
                Some(AppEvent::Key(key)) => handle_key(&mut tui_app, view, config, key).await,
                Some(AppEvent::Resize) => {}
                None => break,
            },
            signal = view.next_signal() => view.handle_signal(signal).await,
        }

        if tui_app.should_quit {
            break;
        }
    }

    info!("Leaving the TUI");
    Ok(())
}

async fn handle_key(app: &mut TuiApp, view: &mut BookmarkView, config: &Config, key: KeyEvent) {
    // The alert blocks everything until dismissed.
    if view.alert().is_some() {
        view.dismiss_alert();
        return;
    }

    if let Some((id, title)) = app.pending_delete.take() {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                view.delete(&id).await;
                app.set_status(format!("Deleted: {}", title));
            }
            _ => {
                app.set_status("Delete cancelled");
            }
        }
        return;
    }

    app.clear_status();
    let action = config.keybindings.get_action(&key);

    if view.identity().is_none() {
        match action {
            Action::Quit => app.should_quit = true,
            Action::SignIn | Action::Submit => {
                view.sign_in();
                app.set_status("Waiting for sign-in in the browser...");
            }
            _ => {}
        }
        return;
    }

    if app.focus.is_input() {
        handle_input_key(app, view, key, action).await;
    } else {
        handle_list_action(app, view, action).await;
    }
}

async fn handle_input_key(
    app: &mut TuiApp,
    view: &mut BookmarkView,
    key: KeyEvent,
    action: Action,
) {
    match action {
        Action::NextFocus => {
            app.focus = app.focus.next();
            return;
        }
        Action::PrevFocus => {
            app.focus = app.focus.prev();
            return;
        }
        Action::Submit => {
            if view.create().await == CreateOutcome::Submitted {
                app.focus = Focus::Title;
            }
            return;
        }
        Action::Quit if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.should_quit = true;
            return;
        }
        _ => {}
    }

    let input = match app.focus {
        Focus::Title => &mut view.title_input,
        Focus::Url => &mut view.url_input,
        Focus::List => return,
    };
    match key.code {
        KeyCode::Esc => app.focus = Focus::List,
        KeyCode::Backspace => {
            input.pop();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => input.clear(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.push(c),
        _ => {}
    }
}

async fn handle_list_action(app: &mut TuiApp, view: &mut BookmarkView, action: Action) {
    match action {
        Action::Quit => app.should_quit = true,
        Action::MoveUp => app.move_up(),
        Action::MoveDown => app.move_down(view.bookmarks().len()),
        Action::NextFocus => app.focus = app.focus.next(),
        Action::PrevFocus => app.focus = app.focus.prev(),
        Action::DeleteBookmark => {
            if let Some(bookmark) = app.selected_bookmark(view.bookmarks()) {
                app.pending_delete = Some((bookmark.id.clone(), bookmark.title.clone()));
            }
        }
        Action::OpenInBrowser | Action::Submit => {
            if let Some(bookmark) = app.selected_bookmark(view.bookmarks()) {
                let url = bookmark.url.trim().to_string();
                if let Err(e) = open::that(&url) {
                    app.set_status(format!("Failed to open browser: {}", e));
                }
            }
        }
        Action::Refresh => {
            view.refresh().await;
            app.set_status(format!("{} bookmarks", view.bookmarks().len()));
        }
        Action::SignOut => {
            if let Err(e) = view.sign_out().await {
                app.set_status(format!("Sign-out failed: {}", e));
            } else {
                app.focus = Focus::Title;
            }
        }
        Action::SignIn | Action::None => {}
    }
}
