//! In-process backend with the same contract as the hosted one.
//!
//! Rows are scoped per user the way a row-level policy would scope them,
//! and change events go to every subscriber without owner filtering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::app::{MarksError, Result};
use crate::backend::{
    AuthProvider, Backend, BookmarkTable, ChangeFeed, ChangeSubscription, FeedCommand,
    SessionBroadcast, SessionListener,
};
use crate::domain::{
    sort_newest_first, Bookmark, ChangeEvent, ChangeKind, Identity, NewBookmark, Session,
};

const TABLE: &str = "bookmarks";

#[derive(Default)]
struct State {
    rows: Vec<Bookmark>,
    tokens: HashMap<String, Identity>,
    last_created: Option<DateTime<Utc>>,
    oauth_identity: Option<Identity>,
    fail_selects: bool,
    fail_writes: bool,
}

struct Shared {
    state: Mutex<State>,
    sessions: SessionBroadcast,
    events: broadcast::Sender<ChangeEvent>,
    selects: AtomicUsize,
    writes: AtomicUsize,
    active_feeds: Arc<AtomicUsize>,
}

#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                sessions: SessionBroadcast::new(None),
                events,
                selects: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
                active_feeds: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Bundle this backend as all three collaborators.
    pub fn backend(&self) -> Backend {
        Backend {
            auth: Arc::new(self.clone()),
            table: Arc::new(self.clone()),
            feed: Arc::new(self.clone()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Issue a session for `user` without touching the current session.
    pub fn issue_session(&self, user: Identity) -> Session {
        let token = format!("mem-{}", Uuid::new_v4());
        self.state().tokens.insert(token.clone(), user.clone());
        Session {
            access_token: token,
            refresh_token: format!("mem-refresh-{}", Uuid::new_v4()),
            expires_at: Utc::now() + Duration::hours(1),
            user,
        }
    }

    /// Sign `user` in and notify session listeners.
    pub fn sign_in_as(&self, user: Identity) -> Session {
        let session = self.issue_session(user);
        self.shared.sessions.publish(Some(session.clone()));
        session
    }

    /// The identity the next OAuth flow will sign in as.
    pub fn set_oauth_identity(&self, user: Identity) {
        self.state().oauth_identity = Some(user);
    }

    /// Swap the current session's token for a fresh one.
    pub fn refresh_session(&self) -> Option<Session> {
        let current = self.shared.sessions.current()?;
        let session = self.issue_session(current.user);
        self.state().tokens.remove(&current.access_token);
        self.shared.sessions.publish(Some(session.clone()));
        Some(session)
    }

    /// Drop the current session as if it expired on the provider side.
    pub fn expire_session(&self) {
        if let Some(current) = self.shared.sessions.current() {
            self.state().tokens.remove(&current.access_token);
        }
        self.shared.sessions.publish(None);
    }

    pub fn fail_selects(&self, fail: bool) {
        self.state().fail_selects = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    pub fn select_count(&self) -> usize {
        self.shared.selects.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }

    pub fn active_feeds(&self) -> usize {
        self.shared.active_feeds.load(Ordering::SeqCst)
    }

    pub fn session_listeners(&self) -> usize {
        self.shared.sessions.listener_count()
    }

    /// Every stored row regardless of owner.
    pub fn all_rows(&self) -> Vec<Bookmark> {
        self.state().rows.clone()
    }

    fn user_for(state: &State, access_token: Option<&str>) -> Result<Identity> {
        access_token
            .and_then(|token| state.tokens.get(token))
            .cloned()
            .ok_or_else(|| MarksError::Backend {
                status: 401,
                message: "JWT missing or invalid".into(),
            })
    }

    fn next_created_at(state: &mut State) -> DateTime<Utc> {
        let now = Utc::now();
        let created = match state.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        state.last_created = Some(created);
        created
    }

    fn notify(&self, kind: ChangeKind, record_id: &str) {
        let event = ChangeEvent::new(kind, TABLE, Some(record_id.to_string()));
        // No receivers just means nobody is subscribed.
        let _ = self.shared.events.send(event);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn current_session(&self) -> Result<Option<Session>> {
        let session = self.shared.sessions.current();
        let state = self.state();
        Ok(session.filter(|s| state.tokens.contains_key(&s.access_token)))
    }

    fn on_session_change(&self) -> SessionListener {
        self.shared.sessions.listen()
    }

    async fn start_oauth(&self, provider: &str) -> Result<()> {
        let user = self
            .state()
            .oauth_identity
            .clone()
            .ok_or_else(|| MarksError::Auth(format!("{} sign-in was cancelled", provider)))?;
        self.sign_in_as(user);
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(current) = self.shared.sessions.current() {
            self.state().tokens.remove(&current.access_token);
        }
        self.shared.sessions.publish(None);
        Ok(())
    }
}

#[async_trait]
impl BookmarkTable for MemoryBackend {
    async fn select_all(&self, access_token: Option<&str>) -> Result<Vec<Bookmark>> {
        self.shared.selects.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        if state.fail_selects {
            return Err(MarksError::Backend {
                status: 503,
                message: "select failed".into(),
            });
        }
        let user = Self::user_for(&state, access_token)?;
        let mut rows: Vec<Bookmark> = state
            .rows
            .iter()
            .filter(|row| row.user_id == user.id)
            .cloned()
            .collect();
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    async fn insert(&self, access_token: Option<&str>, bookmark: &NewBookmark) -> Result<()> {
        self.shared.writes.fetch_add(1, Ordering::SeqCst);
        let id = {
            let mut state = self.state();
            if state.fail_writes {
                return Err(MarksError::Backend {
                    status: 503,
                    message: "insert failed".into(),
                });
            }
            let user = Self::user_for(&state, access_token)?;
            if user.id != bookmark.user_id {
                return Err(MarksError::Backend {
                    status: 403,
                    message: "new row violates row-level security policy".into(),
                });
            }
            let id = Uuid::new_v4().to_string();
            let created_at = Self::next_created_at(&mut state);
            state.rows.push(Bookmark {
                id: id.clone(),
                title: bookmark.title.clone(),
                url: bookmark.url.clone(),
                user_id: bookmark.user_id.clone(),
                created_at,
            });
            id
        };
        self.notify(ChangeKind::Insert, &id);
        Ok(())
    }

    async fn delete(&self, access_token: Option<&str>, id: &str) -> Result<()> {
        self.shared.writes.fetch_add(1, Ordering::SeqCst);
        let removed = {
            let mut state = self.state();
            if state.fail_writes {
                return Err(MarksError::Backend {
                    status: 503,
                    message: "delete failed".into(),
                });
            }
            let user = Self::user_for(&state, access_token)?;
            let before = state.rows.len();
            // Rows owned by someone else are invisible, so they are never matched.
            state
                .rows
                .retain(|row| !(row.id == id && row.user_id == user.id));
            before != state.rows.len()
        };
        if removed {
            self.notify(ChangeKind::Delete, id);
        }
        Ok(())
    }
}

struct FeedGuard(Arc<AtomicUsize>);

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, access_token: &str) -> Result<ChangeSubscription> {
        {
            let state = self.state();
            Self::user_for(&state, Some(access_token))?;
        }

        let mut source = self.shared.events.subscribe();
        let (event_tx, event_rx) = mpsc::channel(64);
        let (control_tx, mut control_rx) = mpsc::channel(8);

        self.shared.active_feeds.fetch_add(1, Ordering::SeqCst);
        let guard = FeedGuard(self.shared.active_feeds.clone());

        let task = tokio::spawn(async move {
            let _guard = guard;
            loop {
                tokio::select! {
                    event = source.recv() => match event {
                        Ok(event) => {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Memory change feed skipped {} events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    command = control_rx.recv() => match command {
                        Some(FeedCommand::AccessToken(_)) => {}
                        Some(FeedCommand::Close) | None => break,
                    },
                }
            }
        });

        Ok(ChangeSubscription::new(event_rx, control_tx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::new("alice", "alice@example.com")
    }

    fn bob() -> Identity {
        Identity::new("bob", "bob@example.com")
    }

    #[tokio::test]
    async fn test_rows_are_scoped_to_owner() {
        let backend = MemoryBackend::new();
        let a = backend.issue_session(alice());
        let b = backend.issue_session(bob());

        let new = NewBookmark::validated("A", "http://a", "alice").unwrap();
        backend.insert(Some(&a.access_token), &new).await.unwrap();

        assert_eq!(backend.select_all(Some(&a.access_token)).await.unwrap().len(), 1);
        assert!(backend.select_all(Some(&b.access_token)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_for_other_owner_is_rejected() {
        let backend = MemoryBackend::new();
        let a = backend.issue_session(alice());
        let new = NewBookmark::validated("A", "http://a", "bob").unwrap();
        let err = backend.insert(Some(&a.access_token), &new).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(backend.all_rows().is_empty());
    }

    #[tokio::test]
    async fn test_delete_ignores_rows_of_other_owner() {
        let backend = MemoryBackend::new();
        let a = backend.issue_session(alice());
        let b = backend.issue_session(bob());
        let new = NewBookmark::validated("A", "http://a", "alice").unwrap();
        backend.insert(Some(&a.access_token), &new).await.unwrap();
        let id = backend.all_rows()[0].id.clone();

        backend.delete(Some(&b.access_token), &id).await.unwrap();
        assert_eq!(backend.all_rows().len(), 1);
    }

    #[tokio::test]
    async fn test_select_without_token_is_unauthorized() {
        let backend = MemoryBackend::new();
        let err = backend.select_all(None).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_created_at_strictly_increases() {
        let backend = MemoryBackend::new();
        let a = backend.issue_session(alice());
        for i in 0..20 {
            let new = NewBookmark::validated(&format!("T{}", i), "http://a", "alice").unwrap();
            backend.insert(Some(&a.access_token), &new).await.unwrap();
        }
        let rows = backend.all_rows();
        assert!(rows.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test]
    async fn test_feed_delivers_events_from_any_owner() {
        let backend = MemoryBackend::new();
        let a = backend.issue_session(alice());
        let b = backend.issue_session(bob());
        let mut subscription = backend.subscribe(&a.access_token).await.unwrap();

        let new = NewBookmark::validated("B", "http://b", "bob").unwrap();
        backend.insert(Some(&b.access_token), &new).await.unwrap();

        let event = subscription.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.table, "bookmarks");
    }

    #[tokio::test]
    async fn test_feed_close_releases_subscription() {
        let backend = MemoryBackend::new();
        let a = backend.issue_session(alice());
        let subscription = backend.subscribe(&a.access_token).await.unwrap();
        assert_eq!(backend.active_feeds(), 1);
        subscription.close().await;
        assert_eq!(backend.active_feeds(), 0);
    }

    #[tokio::test]
    async fn test_start_oauth_without_account_fails() {
        let backend = MemoryBackend::new();
        assert!(backend.start_oauth("google").await.is_err());
        assert!(backend.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_invalidates_token() {
        let backend = MemoryBackend::new();
        let session = backend.sign_in_as(alice());
        backend.sign_out().await.unwrap();
        assert!(backend.current_session().await.unwrap().is_none());
        assert!(backend.select_all(Some(&session.access_token)).await.is_err());
    }
}
