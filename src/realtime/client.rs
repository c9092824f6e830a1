use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::realtime::channel::{Channel, ChannelBuilder};
use crate::realtime::message::{events, RealtimeMessage};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// RealtimeClient options
#[derive(Debug, Clone)]
pub struct RealtimeClientOptions {
    pub heartbeat_interval: Duration,
}

impl Default for RealtimeClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

type ChannelMap = Arc<RwLock<HashMap<String, Arc<Channel>>>>;

/// Client for Supabase Realtime
#[derive(Clone)]
pub struct RealtimeClient {
    url: String,
    key: String,
    options: RealtimeClientOptions,
    next_ref: Arc<AtomicU32>,
    channels: ChannelMap,
    socket: Arc<RwLock<Option<mpsc::Sender<Message>>>>,
    state: Arc<RwLock<ConnectionState>>,
    access_token: Arc<RwLock<Option<String>>>,
}

impl RealtimeClient {
    /// Create a client with default options
    pub fn new(url: &str, key: &str) -> Self {
        Self::new_with_options(url, key, RealtimeClientOptions::default())
    }

    /// Create a client with custom options
    pub fn new_with_options(url: &str, key: &str, options: RealtimeClientOptions) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            options,
            next_ref: Arc::new(AtomicU32::new(1)),
            channels: Arc::new(RwLock::new(HashMap::new())),
            socket: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the user token sent when joining channels
    pub async fn set_auth(&self, token: Option<String>) {
        debug!(present = token.is_some(), "setting realtime auth token");
        *self.access_token.write().await = token;
    }

    /// Current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Start building a channel subscription
    pub fn channel(&self, name: &str) -> ChannelBuilder {
        ChannelBuilder::new(self.clone(), name)
    }

    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// The websocket endpoint for this project
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(Error::realtime(format!("unsupported URL scheme: {}", other))),
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::realtime("cannot switch URL to websocket scheme"))?;
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    /// Open the websocket and start the reader and writer tasks
    pub async fn connect(&self) -> Result<()> {
        let ws_url = self.websocket_url()?;
        *self.state.write().await = ConnectionState::Connecting;
        info!(host = ?ws_url.host_str(), "connecting to realtime");

        let ws_stream = match connect_async(ws_url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!(error = %e, "realtime connection failed");
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(Error::realtime(format!("connection failed: {}", e)));
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let (socket_tx, mut socket_rx) = mpsc::channel::<Message>(100);
        *self.socket.write().await = Some(socket_tx.clone());
        *self.state.write().await = ConnectionState::Connected;

        tokio::spawn(async move {
            while let Some(message) = socket_rx.recv().await {
                trace!(?message, "sending realtime frame");
                if let Err(e) = write.send(message).await {
                    error!(error = %e, "realtime send failed");
                    break;
                }
            }
            debug!("realtime writer finished");
        });

        let channels = self.channels.clone();
        let socket = self.socket.clone();
        let state = self.state.clone();
        let next_ref = self.next_ref.clone();
        let heartbeat_interval = self.options.heartbeat_interval;

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(heartbeat_interval);
            heartbeat.tick().await;

            loop {
                tokio::select! {
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => route(&channels, &text).await,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "realtime read failed");
                            break;
                        }
                    },
                    _ = heartbeat.tick() => {
                        let beat = json!({
                            "topic": "phoenix",
                            "event": events::HEARTBEAT,
                            "payload": {},
                            "ref": next_ref.fetch_add(1, Ordering::SeqCst).to_string(),
                        });
                        if socket_tx.send(Message::Text(beat.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            *socket.write().await = None;
            *state.write().await = ConnectionState::Disconnected;
            info!("realtime connection closed");
        });

        Ok(())
    }

    /// Close the connection
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(tx) = self.socket.write().await.take() {
            let _ = tx.send(Message::Close(None)).await;
        }
        self.channels.write().await.clear();
        *self.state.write().await = ConnectionState::Disconnected;
        Ok(())
    }

    async fn send(&self, message: &RealtimeMessage) -> Result<()> {
        let socket = self.socket.read().await;
        let tx = socket
            .as_ref()
            .ok_or_else(|| Error::realtime("not connected"))?;
        tx.send(Message::Text(serde_json::to_string(message)?))
            .await
            .map_err(|e| Error::realtime(format!("socket task gone: {}", e)))
    }

    pub(crate) async fn join(&self, channel: Arc<Channel>) -> Result<()> {
        let token = self.access_token.read().await.clone();
        let join = channel.join_message(self.next_ref(), token);
        self.channels
            .write()
            .await
            .insert(channel.topic().to_string(), channel);

        if let Err(e) = self.send(&join).await {
            self.channels.write().await.remove(&join.topic);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) async fn leave(&self, topic: &str) -> Result<()> {
        if self.channels.write().await.remove(topic).is_none() {
            return Ok(());
        }
        let leave = RealtimeMessage {
            topic: topic.to_string(),
            event: events::LEAVE.to_string(),
            payload: json!({}),
            message_ref: Some(self.next_ref()),
        };
        match self.send(&leave).await {
            Err(Error::Realtime(_)) => {
                debug!(topic, "socket already closed, nothing to leave");
                Ok(())
            }
            other => other,
        }
    }
}

/// Hand an incoming frame to the channel it is addressed to
pub(crate) async fn route(channels: &ChannelMap, text: &str) {
    let message = match serde_json::from_str::<RealtimeMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "unparseable realtime frame");
            return;
        }
    };

    let channel = channels.read().await.get(&message.topic).cloned();
    match channel {
        Some(channel) => channel.handle_message(&message),
        None if message.topic == "phoenix" => trace!("heartbeat reply"),
        None => debug!(topic = %message.topic, "frame for unknown topic"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::DatabaseChanges;
    use std::sync::Mutex;

    #[test]
    fn websocket_url_switches_scheme() {
        let client = RealtimeClient::new("https://demo.supabase.co", "anon");
        assert_eq!(
            client.websocket_url().unwrap().as_str(),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[tokio::test]
    async fn routes_frames_by_topic() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let client = RealtimeClient::new("http://localhost:54321", "anon");
        let (_, channel) = client
            .channel("attendance")
            .on(DatabaseChanges::new("attendance"), move |_| {
                *counter.lock().unwrap() += 1;
            })
            .build();
        client
            .channels
            .write()
            .await
            .insert("realtime:attendance".to_string(), Arc::new(channel));

        let frame = json!({
            "topic": "realtime:attendance",
            "event": "postgres_changes",
            "payload": { "data": {
                "type": "DELETE", "schema": "public", "table": "attendance",
                "record": {}, "old_record": { "id": "r1" }
            }},
            "ref": null
        })
        .to_string();

        route(&client.channels, &frame).await;
        route(&client.channels, &frame.replace("realtime:attendance", "realtime:other")).await;
        route(&client.channels, "not json").await;

        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn subscribing_without_connection_fails() {
        let client = RealtimeClient::new("http://localhost:54321", "anon");
        let result = client
            .channel("attendance")
            .on(DatabaseChanges::new("attendance"), |_| {})
            .subscribe()
            .await;
        assert!(matches!(result, Err(Error::Realtime(_))));
        assert!(client.channels.read().await.is_empty());
    }
}
