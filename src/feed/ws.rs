//! WebSocket client for the per-project live feed.

use super::FeedEnvelope;
use crate::error::{BoardError, Result};
use crate::models::{EntityId, UserId};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Interval between client heartbeats
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Channel capacity used by [`WsFeed::spawn`]
const FEED_BUFFER: usize = 64;

pub struct WsFeed {
    url: String,
    user: Option<UserId>,
    heartbeat: Duration,
}

/// `http(s)://host` becomes `ws(s)://host/ws/projects/{id}`
pub fn feed_url(server_url: &str, project_id: &EntityId) -> String {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/ws/projects/{}", base, project_id)
}

/// Parse one text frame; malformed frames are logged and skipped
pub fn parse_frame(text: &str) -> Option<FeedEnvelope> {
    match serde_json::from_str::<FeedEnvelope>(text) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed feed frame");
            None
        },
    }
}

impl WsFeed {
    pub fn new(server_url: &str, project_id: &EntityId, user: Option<UserId>) -> Self {
        Self {
            url: feed_url(server_url, project_id),
            user,
            heartbeat: HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect and forward envelopes into `tx` until the server closes the
    /// socket or the receiver is dropped.
    pub async fn run(&self, tx: mpsc::Sender<FeedEnvelope>) -> Result<()> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| BoardError::Feed(e.to_string()))?;
        if let Some(user) = &self.user {
            let value = HeaderValue::from_str(&format!("Bearer {}", user))
                .map_err(|e| BoardError::Feed(e.to_string()))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| BoardError::Feed(format!("Failed to connect to {}: {}", self.url, e)))?;
        tracing::info!(url = %self.url, "Live feed connected");

        let (mut write, mut read) = ws_stream.split();
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        // the first tick completes immediately
        heartbeat.tick().await;

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let Some(envelope) = parse_frame(&text) else {
                                continue;
                            };
                            tracing::trace!(event = envelope.event.kind(), "Feed event received");
                            if tx.send(envelope).await.is_err() {
                                tracing::debug!("Feed receiver dropped, closing socket");
                                let _ = write.send(Message::Close(None)).await;
                                return Ok(());
                            }
                        },
                        Some(Ok(Message::Ping(payload))) => {
                            if write.send(Message::Pong(payload)).await.is_err() {
                                return Err(BoardError::Feed("Failed to answer ping".into()));
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Live feed closed by server");
                            return Ok(());
                        },
                        Some(Ok(_)) => {},
                        Some(Err(e)) => {
                            return Err(BoardError::Feed(e.to_string()));
                        },
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        return Err(BoardError::Feed(format!("Heartbeat failed: {}", e)));
                    }
                }
                _ = tx.closed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    /// Run the feed on its own task, returning the receiving end
    pub fn spawn(self) -> (JoinHandle<Result<()>>, mpsc::Receiver<FeedEnvelope>) {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let handle = tokio::spawn(async move { self.run(tx).await });
        (handle, rx)
    }
}
