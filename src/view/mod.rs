//! The bookmark screen's state, independent of how it is drawn.
//!
//! [`BookmarkView`] owns the current identity, the displayed list, the
//! form inputs and the two live registrations (session listener and change
//! subscription). Front ends drive it with [`BookmarkView::next_signal`] and
//! [`BookmarkView::handle_signal`] and render from [`BookmarkView::screen`].

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::Result;
use crate::backend::{Backend, ChangeSubscription, SessionListener};
use crate::domain::{Bookmark, ChangeEvent, Identity, NewBookmark, Session};

pub const MISSING_FIELDS_ALERT: &str = "Please enter both title and URL";
pub const EMPTY_MESSAGE: &str = "No bookmarks added yet.";

/// What the screen should show.
#[derive(Debug, PartialEq, Eq)]
pub enum Screen<'a> {
    SignedOut,
    Empty,
    List(&'a [Bookmark]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The insert was sent and the list re-fetched. Insert errors are only logged.
    Submitted,
    /// A field was blank; the alert is set and nothing was sent.
    Rejected,
    SignedOut,
}

/// Something the view is waiting on has happened.
#[derive(Debug)]
pub enum Signal {
    Session(Option<Session>),
    Change(ChangeEvent),
    FeedClosed,
    ListenerClosed,
}

pub struct BookmarkView {
    backend: Backend,
    provider: String,
    session: Option<Session>,
    bookmarks: Vec<Bookmark>,
    pub title_input: String,
    pub url_input: String,
    alert: Option<String>,
    listener: Option<SessionListener>,
    subscription: Option<ChangeSubscription>,
    sign_in_task: Option<JoinHandle<()>>,
}

impl BookmarkView {
    pub fn new(backend: Backend, provider: impl Into<String>) -> Self {
        Self {
            backend,
            provider: provider.into(),
            session: None,
            bookmarks: Vec::new(),
            title_input: String::new(),
            url_input: String::new(),
            alert: None,
            listener: None,
            subscription: None,
            sign_in_task: None,
        }
    }

    /// Register for session changes and load the current session.
    pub async fn initialize(&mut self) {
        // Listen first so a change racing the lookup is not lost.
        self.listener = Some(self.backend.auth.on_session_change());
        let session = match self.backend.auth.current_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not read the current session: {}", e);
                None
            }
        };
        self.apply_session(session).await;
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn screen(&self) -> Screen<'_> {
        match (&self.session, self.bookmarks.is_empty()) {
            (None, _) => Screen::SignedOut,
            (Some(_), true) => Screen::Empty,
            (Some(_), false) => Screen::List(&self.bookmarks),
        }
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn sign_in_pending(&self) -> bool {
        self.sign_in_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Replace the list with a fresh fetch. On failure the list is kept.
    pub async fn refresh(&mut self) {
        let Some(token) = self.session.as_ref().map(|s| s.access_token.clone()) else {
            return;
        };
        match self.backend.table.select_all(Some(&token)).await {
            Ok(rows) => {
                debug!("Fetched {} bookmarks", rows.len());
                self.bookmarks = rows;
            }
            Err(e) => warn!("Failed to fetch bookmarks: {}", e),
        }
    }

    /// Move to the identity carried by `next`.
    pub async fn apply_session(&mut self, next: Option<Session>) {
        let previous = self.session.take();
        match (previous, next) {
            (None, None) => {}
            (Some(old), None) => {
                info!("Signed out {}", old.user.display_name());
                self.leave_signed_in().await;
            }
            (None, Some(session)) => {
                info!("Signed in as {}", session.user.display_name());
                self.session = Some(session);
                self.enter_signed_in().await;
            }
            (Some(old), Some(session)) if old.same_user(&session) => {
                let token_changed = old.access_token != session.access_token;
                if self.subscription.is_none() {
                    // Changes made while the feed was down were never delivered.
                    self.session = Some(session);
                    self.subscribe().await;
                    self.refresh().await;
                } else if token_changed {
                    debug!("Forwarding refreshed token to change feed");
                    if let Some(subscription) = &self.subscription {
                        subscription.set_access_token(&session.access_token).await;
                    }
                    self.session = Some(session);
                } else {
                    self.session = Some(session);
                }
            }
            (Some(old), Some(session)) => {
                info!(
                    "Switched from {} to {}",
                    old.user.display_name(),
                    session.user.display_name()
                );
                self.leave_signed_in().await;
                self.session = Some(session);
                self.enter_signed_in().await;
            }
        }
    }

    async fn enter_signed_in(&mut self) {
        self.refresh().await;
        self.subscribe().await;
    }

    async fn leave_signed_in(&mut self) {
        self.close_subscription().await;
        self.bookmarks.clear();
        self.title_input.clear();
        self.url_input.clear();
    }

    async fn subscribe(&mut self) {
        let Some(token) = self.session.as_ref().map(|s| s.access_token.clone()) else {
            return;
        };
        match self.backend.feed.subscribe(&token).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => warn!("Live updates unavailable: {}", e),
        }
    }

    async fn close_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close().await;
        }
    }

    /// Wait for a session change or a change event.
    ///
    /// Cancel safe; pending forever when neither registration is active.
    pub async fn next_signal(&mut self) -> Signal {
        let listener = &mut self.listener;
        let subscription = &mut self.subscription;
        tokio::select! {
            changed = async move {
                match listener.as_mut() {
                    Some(listener) => listener.changed().await,
                    None => std::future::pending().await,
                }
            } => match changed {
                Some(session) => Signal::Session(session),
                None => Signal::ListenerClosed,
            },
            event = async move {
                match subscription.as_mut() {
                    Some(subscription) => subscription.next().await,
                    None => std::future::pending().await,
                }
            } => match event {
                Some(event) => Signal::Change(event),
                None => Signal::FeedClosed,
            },
        }
    }

    pub async fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Session(session) => self.apply_session(session).await,
            Signal::Change(event) => {
                debug!("{:?} on {}, re-listing", event.kind, event.table);
                self.refresh().await;
            }
            Signal::FeedClosed => {
                warn!("Change feed ended; live updates stopped");
                self.subscription = None;
            }
            Signal::ListenerClosed => {
                warn!("Session listener ended");
                self.listener = None;
            }
        }
    }

    /// Validate the form and insert it as a new bookmark.
    pub async fn create(&mut self) -> CreateOutcome {
        let Some(session) = &self.session else {
            return CreateOutcome::SignedOut;
        };
        let Some(new) =
            NewBookmark::validated(&self.title_input, &self.url_input, &session.user.id)
        else {
            self.alert = Some(MISSING_FIELDS_ALERT.to_string());
            return CreateOutcome::Rejected;
        };
        let token = session.access_token.clone();

        if let Err(e) = self.backend.table.insert(Some(&token), &new).await {
            warn!("Failed to add bookmark {:?}: {}", new.title, e);
        }
        self.title_input.clear();
        self.url_input.clear();
        self.refresh().await;
        CreateOutcome::Submitted
    }

    pub async fn delete(&mut self, id: &str) {
        let Some(token) = self.session.as_ref().map(|s| s.access_token.clone()) else {
            warn!("Ignoring delete of {} while signed out", id);
            return;
        };
        if let Err(e) = self.backend.table.delete(Some(&token), id).await {
            warn!("Failed to delete bookmark {}: {}", id, e);
        }
        self.refresh().await;
    }

    /// Start the OAuth flow in the background. The result arrives as a
    /// session change.
    pub fn sign_in(&mut self) {
        if self.sign_in_pending() {
            debug!("Sign-in already in progress");
            return;
        }
        let auth = self.backend.auth.clone();
        let provider = self.provider.clone();
        self.sign_in_task = Some(tokio::spawn(async move {
            if let Err(e) = auth.start_oauth(&provider).await {
                warn!("Sign-in with {} failed: {}", provider, e);
            }
        }));
    }

    pub async fn sign_out(&mut self) -> Result<()> {
        self.backend.auth.sign_out().await?;
        self.apply_session(None).await;
        Ok(())
    }

    /// Release every registration the view holds.
    pub async fn teardown(&mut self) {
        self.close_subscription().await;
        self.listener = None;
        if let Some(task) = self.sign_in_task.take() {
            task.abort();
        }
    }
}
