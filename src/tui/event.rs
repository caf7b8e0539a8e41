use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use tokio::sync::mpsc;
use tracing::warn;

pub enum AppEvent {
    Key(KeyEvent),
    Resize,
}

/// Polls crossterm on a plain thread and forwards events to the async loop.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EventHandler {
    pub fn new(poll_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let thread = thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                let ready = match event::poll(poll_rate) {
                    Ok(ready) => ready,
                    Err(e) => {
                        warn!("Terminal poll failed: {}", e);
                        break;
                    }
                };
                if !ready {
                    continue;
                }
                let forwarded = match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        tx.send(AppEvent::Key(key))
                    }
                    Ok(Event::Resize(_, _)) => tx.send(AppEvent::Resize),
                    Ok(_) => Ok(()),
                    Err(e) => {
                        warn!("Terminal read failed: {}", e);
                        break;
                    }
                };
                if forwarded.is_err() {
                    break;
                }
            }
        });

        Self {
            rx,
            stop,
            thread: Some(thread),
        }
    }

    /// Next terminal event; `None` once the polling thread has stopped.
    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    MoveUp,
    MoveDown,
    NextFocus,
    PrevFocus,
    Submit,
    DeleteBookmark,
    OpenInBrowser,
    Refresh,
    SignIn,
    SignOut,
    None,
}
