//! Supabase Realtime change feed over a Phoenix channel websocket.
//!
//! ```text
//! connect ─► phx_join (postgres_changes: *) ─► phx_reply ok
//!         ─► postgres_changes ... / heartbeat every 25s ─► phx_leave
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::app::{MarksError, Result};
use crate::backend::{ChangeFeed, ChangeSubscription, FeedCommand};
use crate::config::BackendConfig;
use crate::domain::{ChangeEvent, ChangeKind};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, msg_ref: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
            join_ref: None,
        }
    }

    pub fn join(
        topic: &str,
        schema: &str,
        table: &str,
        access_token: &str,
        msg_ref: String,
    ) -> Self {
        let payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": schema, "table": table }
                ],
            },
            "access_token": access_token,
        });
        let mut message = Self::new(topic, "phx_join", payload, msg_ref.clone());
        message.join_ref = Some(msg_ref);
        message
    }

    pub fn heartbeat(msg_ref: String) -> Self {
        Self::new("phoenix", "heartbeat", json!({}), msg_ref)
    }

    pub fn leave(topic: &str, join_ref: &str, msg_ref: String) -> Self {
        let mut message = Self::new(topic, "phx_leave", json!({}), msg_ref);
        message.join_ref = Some(join_ref.to_string());
        message
    }

    pub fn access_token(topic: &str, join_ref: &str, token: &str, msg_ref: String) -> Self {
        let payload = json!({ "access_token": token });
        let mut message = Self::new(topic, "access_token", payload, msg_ref);
        message.join_ref = Some(join_ref.to_string());
        message
    }

    /// The change this message announces, if it is a `postgres_changes` push.
    pub fn change_event(&self) -> Option<ChangeEvent> {
        if self.event != "postgres_changes" {
            return None;
        }
        let data = self.payload.get("data")?;
        let kind: ChangeKind = serde_json::from_value(data.get("type")?.clone()).ok()?;
        let table = data.get("table").and_then(Value::as_str).unwrap_or_default();
        let record_id = ["record", "old_record"]
            .iter()
            .filter_map(|key| data.get(key)?.get("id"))
            .find_map(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        Some(ChangeEvent::new(kind, table, record_id))
    }

    /// The outcome of the reply to `request_ref`, if this is that reply.
    pub fn reply_to(&self, request_ref: &str) -> Option<Result<()>> {
        if self.event != "phx_reply" || self.msg_ref.as_deref() != Some(request_ref) {
            return None;
        }
        match self.payload.get("status").and_then(Value::as_str) {
            Some("ok") => Some(Ok(())),
            status => {
                let reason = self
                    .payload
                    .pointer("/response/reason")
                    .and_then(Value::as_str)
                    .unwrap_or(status.unwrap_or("no status"));
                Some(Err(MarksError::Realtime(format!("join rejected: {}", reason))))
            }
        }
    }

    /// Whether the server has shut the channel down.
    pub fn closes_channel(&self, topic: &str) -> bool {
        if self.topic != topic {
            return false;
        }
        match self.event.as_str() {
            "phx_close" | "phx_error" => true,
            "system" => self.payload.get("status").and_then(Value::as_str) == Some("error"),
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
struct RefCounter(u64);

impl RefCounter {
    fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}

pub struct RealtimeFeed {
    config: BackendConfig,
}

impl RealtimeFeed {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    fn topic(&self) -> String {
        format!("realtime:{}", self.config.channel)
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, access_token: &str) -> Result<ChangeSubscription> {
        let url = self.config.realtime_url()?;
        debug!("Connecting to realtime at {}", url.path());
        let (mut socket, _) = connect_async(url.as_str()).await?;

        let topic = self.topic();
        let mut refs = RefCounter::default();
        let join_ref = refs.next();
        let join = PhoenixMessage::join(
            &topic,
            &self.config.schema,
            &self.config.table,
            access_token,
            join_ref.clone(),
        );
        send(&mut socket, &join).await?;

        tokio::time::timeout(JOIN_TIMEOUT, wait_for_reply(&mut socket, &join_ref))
            .await
            .map_err(|_| MarksError::Realtime("timed out joining channel".into()))??;
        info!("Subscribed to changes on {}.{}", self.config.schema, self.config.table);

        let (event_tx, event_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::channel(8);
        let channel = Channel {
            socket,
            topic,
            join_ref,
            refs,
        };
        let task = tokio::spawn(channel.run(event_tx, control_rx));
        Ok(ChangeSubscription::new(event_rx, control_tx, task))
    }
}

async fn send(socket: &mut Socket, message: &PhoenixMessage) -> Result<()> {
    let text = serde_json::to_string(message)?;
    socket.send(Message::text(text)).await?;
    Ok(())
}

async fn wait_for_reply(socket: &mut Socket, request_ref: &str) -> Result<()> {
    while let Some(frame) = socket.next().await {
        match frame? {
            Message::Text(text) => {
                let message: PhoenixMessage = match serde_json::from_str(text.as_str()) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!("Skipping unparseable frame while joining: {}", e);
                        continue;
                    }
                };
                if let Some(outcome) = message.reply_to(request_ref) {
                    return outcome;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(MarksError::Realtime("socket closed while joining".into()))
}

struct Channel {
    socket: Socket,
    topic: String,
    join_ref: String,
    refs: RefCounter,
}

impl Channel {
    async fn run(
        mut self,
        events: mpsc::Sender<ChangeEvent>,
        mut control: mpsc::Receiver<FeedCommand>,
    ) {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let message = PhoenixMessage::heartbeat(self.refs.next());
                    if let Err(e) = send(&mut self.socket, &message).await {
                        warn!("Realtime heartbeat failed: {}", e);
                        break;
                    }
                }
                command = control.recv() => match command {
                    Some(FeedCommand::AccessToken(token)) => {
                        let message = PhoenixMessage::access_token(
                            &self.topic,
                            &self.join_ref,
                            &token,
                            self.refs.next(),
                        );
                        if let Err(e) = send(&mut self.socket, &message).await {
                            warn!("Could not forward refreshed token: {}", e);
                            break;
                        }
                    }
                    Some(FeedCommand::Close) | None => {
                        self.leave().await;
                        break;
                    }
                },
                frame = self.socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let message: PhoenixMessage = match serde_json::from_str(text.as_str()) {
                            Ok(message) => message,
                            Err(e) => {
                                debug!("Skipping unparsable realtime frame: {}", e);
                                continue;
                            }
                        };
                        if let Some(event) = message.change_event() {
                            debug!("Change on {}: {:?}", event.table, event.kind);
                            if events.send(event).await.is_err() {
                                self.leave().await;
                                break;
                            }
                        } else if message.closes_channel(&self.topic) {
                            warn!("Realtime channel closed by server: {}", message.payload);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Realtime socket error: {}", e);
                        break;
                    }
                },
            }
        }
        info!("Realtime channel {} stopped", self.topic);
    }

    async fn leave(&mut self) {
        let message = PhoenixMessage::leave(&self.topic, &self.join_ref, self.refs.next());
        if let Err(e) = send(&mut self.socket, &message).await {
            debug!("phx_leave not delivered: {}", e);
        }
        let _ = self.socket.close(None).await;
    }
}
