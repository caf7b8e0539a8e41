//! Collaborators the bookmark view talks to.
//!
//! ```text
//! AuthProvider  ── sessions, sign-in/out, session-change listener
//! BookmarkTable ── select-all / insert / delete on the bookmark table
//! ChangeFeed    ── insert/update/delete notifications for that table
//! ```
//!
//! Every registration is handed out as an owned handle
//! ([`SessionListener`], [`ChangeSubscription`]); dropping the handle
//! releases it.

pub mod auth;
pub mod http;
#[cfg(test)]
pub mod memory;
pub mod oauth;
pub mod realtime;
pub mod rest;
pub mod session_store;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::app::Result;
use crate::domain::{Bookmark, ChangeEvent, NewBookmark, Session};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current session, if one exists and is still accepted by the provider.
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Register for session changes (sign-in, sign-out, token refresh).
    fn on_session_change(&self) -> SessionListener;

    /// Run the OAuth flow for `provider` until a session is established.
    async fn start_oauth(&self, provider: &str) -> Result<()>;

    /// End the current session.
    async fn sign_out(&self) -> Result<()>;
}

#[async_trait]
pub trait BookmarkTable: Send + Sync {
    /// All visible rows, newest first.
    async fn select_all(&self, access_token: Option<&str>) -> Result<Vec<Bookmark>>;

    async fn insert(&self, access_token: Option<&str>, bookmark: &NewBookmark) -> Result<()>;

    async fn delete(&self, access_token: Option<&str>, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to every insert/update/delete on the bookmark table.
    async fn subscribe(&self, access_token: &str) -> Result<ChangeSubscription>;
}

/// The three collaborators bundled for the view.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub table: Arc<dyn BookmarkTable>,
    pub feed: Arc<dyn ChangeFeed>,
}

/// Publisher side of the session-change broadcast.
///
/// Providers keep one of these and hand out [`SessionListener`]s from it.
#[derive(Debug)]
pub struct SessionBroadcast {
    tx: watch::Sender<Option<Session>>,
}

impl SessionBroadcast {
    pub fn new(initial: Option<Session>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn publish(&self, session: Option<Session>) {
        self.tx.send_replace(session);
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn listen(&self) -> SessionListener {
        let mut rx = self.tx.subscribe();
        rx.mark_unchanged();
        SessionListener { rx }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Registration for session-change notifications. Dropping it unregisters.
#[derive(Debug)]
pub struct SessionListener {
    rx: watch::Receiver<Option<Session>>,
}

impl SessionListener {
    /// Wait for the next session change.
    ///
    /// Returns `None` once the provider has gone away.
    pub async fn changed(&mut self) -> Option<Option<Session>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Commands accepted by a running change-feed task.
#[derive(Debug)]
pub enum FeedCommand {
    AccessToken(String),
    Close,
}

/// A live change-feed subscription.
///
/// The delivering task is aborted when the subscription is dropped, so an
/// unsubscribe happens on every teardown path.
pub struct ChangeSubscription {
    events: mpsc::Receiver<ChangeEvent>,
    control: mpsc::Sender<FeedCommand>,
    task: Option<JoinHandle<()>>,
}

impl ChangeSubscription {
    pub fn new(
        events: mpsc::Receiver<ChangeEvent>,
        control: mpsc::Sender<FeedCommand>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            control,
            task: Some(task),
        }
    }

    /// Next change event; `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub async fn set_access_token(&self, token: &str) {
        if self
            .control
            .send(FeedCommand::AccessToken(token.to_string()))
            .await
            .is_err()
        {
            tracing::debug!("Change feed already stopped; token not forwarded");
        }
    }

    /// Leave the channel and wait for the feed task to finish.
    pub async fn close(mut self) {
        let _ = self.control.send(FeedCommand::Close).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
