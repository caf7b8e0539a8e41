use crate::app::{MarksError, Result};
use crate::backend::Backend;
use crate::domain::Bookmark;
use crate::view::{BookmarkView, CreateOutcome, Screen, Signal, EMPTY_MESSAGE, MISSING_FIELDS_ALERT};

async fn open_view(backend: &Backend, provider: &str) -> BookmarkView {
    let mut view = BookmarkView::new(backend.clone(), provider);
    view.initialize().await;
    view
}

fn require_signed_in(view: &BookmarkView) -> Result<()> {
    match view.identity() {
        Some(_) => Ok(()),
        None => Err(MarksError::NotSignedIn),
    }
}

/// The list as printed by `list`, `add`, `remove` and `watch`.
pub fn format_bookmarks(view: &BookmarkView) -> String {
    match view.screen() {
        Screen::SignedOut => "Not signed in. Run `smartmarks login` first.".to_string(),
        Screen::Empty => EMPTY_MESSAGE.to_string(),
        Screen::List(bookmarks) => bookmarks
            .iter()
            .map(format_bookmark)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn format_bookmark(bookmark: &Bookmark) -> String {
    format!(
        "{}  {}\n  {}  ({})",
        bookmark.created_at.format("%Y-%m-%d %H:%M"),
        bookmark.title,
        bookmark.url,
        bookmark.id
    )
}

pub async fn login(backend: &Backend, provider: &str) -> Result<()> {
    if let Some(session) = backend.auth.current_session().await? {
        println!("Already signed in as {}", session.user.display_name());
        return Ok(());
    }

    println!("Opening the browser to sign in with {}...", provider);
    backend.auth.start_oauth(provider).await?;

    let session = backend
        .auth
        .current_session()
        .await?
        .ok_or_else(|| MarksError::Auth("sign-in finished without a session".into()))?;
    println!("Signed in as {}", session.user.display_name());
    Ok(())
}

pub async fn logout(backend: &Backend, provider: &str) -> Result<()> {
    let mut view = open_view(backend, provider).await;
    let result = match view.identity().map(|u| u.display_name().to_string()) {
        Some(name) => view.sign_out().await.map(|()| println!("Signed out {}", name)),
        None => {
            println!("Not signed in");
            Ok(())
        }
    };
    view.teardown().await;
    result
}

pub async fn whoami(backend: &Backend) -> Result<()> {
    match backend.auth.current_session().await? {
        Some(session) => {
            println!("{}", session.user.display_name());
            println!("  id: {}", session.user.id);
            println!(
                "  session expires: {}",
                session.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

pub async fn list(backend: &Backend, provider: &str) -> Result<()> {
    let mut view = open_view(backend, provider).await;
    println!("{}", format_bookmarks(&view));
    view.teardown().await;
    Ok(())
}

pub async fn add(backend: &Backend, provider: &str, title: &str, url: &str) -> Result<()> {
    let mut view = open_view(backend, provider).await;
    let result = add_to(&mut view, title, url).await;
    view.teardown().await;
    result
}

async fn add_to(view: &mut BookmarkView, title: &str, url: &str) -> Result<()> {
    view.title_input = title.to_string();
    view.url_input = url.to_string();
    match view.create().await {
        CreateOutcome::Submitted => {
            println!("{}", format_bookmarks(view));
            Ok(())
        }
        CreateOutcome::Rejected => Err(MarksError::Validation(MISSING_FIELDS_ALERT.into())),
        CreateOutcome::SignedOut => Err(MarksError::NotSignedIn),
    }
}

pub async fn remove(backend: &Backend, provider: &str, id: &str) -> Result<()> {
    let mut view = open_view(backend, provider).await;
    let result = remove_from(&mut view, id).await;
    view.teardown().await;
    result
}

async fn remove_from(view: &mut BookmarkView, id: &str) -> Result<()> {
    require_signed_in(view)?;
    view.delete(id).await;
    println!("{}", format_bookmarks(view));
    Ok(())
}

/// Print the list, then reprint it after every change until Ctrl+c.
pub async fn watch(backend: &Backend, provider: &str) -> Result<()> {
    let mut view = open_view(backend, provider).await;
    let result = watch_view(&mut view).await;
    view.teardown().await;
    result
}

async fn watch_view(view: &mut BookmarkView) -> Result<()> {
    require_signed_in(view)?;
    if !view.is_subscribed() {
        return Err(MarksError::Realtime("could not subscribe to changes".into()));
    }
    println!("{}", format_bookmarks(view));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            signal = view.next_signal() => {
                let reprint = matches!(signal, Signal::Change(_));
                let stopped = matches!(signal, Signal::FeedClosed | Signal::Session(None));
                view.handle_signal(signal).await;
                if stopped {
                    println!("Live updates stopped");
                    break;
                }
                if reprint {
                    println!("\n{}", format_bookmarks(view));
                }
            }
        }
    }
    Ok(())
}
