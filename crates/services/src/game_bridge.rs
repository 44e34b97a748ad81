//! Delivery of NPC actions to the running game.
//!
//! The game either lives in the same process (actions go over a channel, the
//! way a page receives `postMessage`) or listens on a WebSocket.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub const ALLOWED_ACTIONS: &[&str] = &[
    "move_to",
    "say",
    "emote",
    "give_item",
    "follow",
    "attack",
    "idle",
];

/// Envelope sent to the game for every action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Uuid,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

impl GameAction {
    pub fn new(
        action: &str,
        target: Option<String>,
        payload: serde_json::Value,
    ) -> Result<Self> {
        let action = action.trim().to_lowercase();
        if !ALLOWED_ACTIONS.contains(&action.as_str()) {
            bail!(
                "Unsupported game action '{}'. Supported actions: {}",
                action,
                ALLOWED_ACTIONS.join(", ")
            );
        }
        Ok(Self {
            kind: "npc_action".to_string(),
            id: Uuid::new_v4(),
            action,
            target: target.filter(|t| !t.trim().is_empty()),
            payload,
            sent_at: Utc::now(),
        })
    }
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

pub enum GameBridge {
    /// In-process delivery
    Host(mpsc::UnboundedSender<GameAction>),
    WebSocket {
        url: Url,
        sink: Mutex<Option<WsSink>>,
    },
    /// No game attached
    Disconnected,
}

impl GameBridge {
    pub fn host(sender: mpsc::UnboundedSender<GameAction>) -> Self {
        GameBridge::Host(sender)
    }

    pub fn websocket(url: &str) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid game WebSocket URL '{}'", url))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            bail!("game WebSocket URL must use ws:// or wss://, got '{}'", url);
        }
        Ok(GameBridge::WebSocket {
            url,
            sink: Mutex::new(None),
        })
    }

    pub fn disconnected() -> Self {
        GameBridge::Disconnected
    }

    pub fn describe(&self) -> String {
        match self {
            GameBridge::Host(_) => "host".to_string(),
            GameBridge::WebSocket { url, .. } => url.to_string(),
            GameBridge::Disconnected => "disconnected".to_string(),
        }
    }

    pub async fn dispatch(&self, action: &GameAction) -> Result<()> {
        match self {
            GameBridge::Host(sender) => sender
                .send(action.clone())
                .map_err(|_| anyhow!("the game host is no longer listening")),
            GameBridge::WebSocket { url, sink } => {
                let text = serde_json::to_string(action)?;
                let mut guard = sink.lock().await;

                // One reconnect attempt if the cached connection has gone away
                for attempt in 0..2 {
                    if guard.is_none() {
                        *guard = Some(Self::connect(url).await?);
                    }
                    let Some(ws) = guard.as_mut() else {
                        continue;
                    };
                    match ws.send(WsMessage::Text(text.clone().into())).await {
                        Ok(()) => {
                            debug!(action = %action.action, id = %action.id, "sent game action");
                            return Ok(());
                        }
                        Err(e) => {
                            warn!(error = %e, attempt, "game socket send failed");
                            *guard = None;
                        }
                    }
                }
                Err(anyhow!("could not deliver action to {}", url))
            }
            GameBridge::Disconnected => Err(anyhow!(
                "No game is connected. Configure a game WebSocket URL to send actions."
            )),
        }
    }

    async fn connect(url: &Url) -> Result<WsSink> {
        let (stream, _resp) = connect_async(url.as_str())
            .await
            .with_context(|| format!("could not connect to game at {}", url))?;
        info!(url = %url, "connected to game socket");
        let (sink, mut incoming) = stream.split();
        // Drain whatever the game sends back so the connection stays healthy
        tokio::spawn(async move {
            while let Some(frame) = incoming.next().await {
                match frame {
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(other) => debug!(?other, "game socket frame"),
                }
            }
        });
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_action_validation() {
        let action =
            GameAction::new(" Say ", Some("guard".into()), serde_json::json!({"text": "hi"}))
                .unwrap();
        assert_eq!(action.action, "say");
        assert_eq!(action.kind, "npc_action");

        let err = GameAction::new("explode", None, serde_json::Value::Null).unwrap_err();
        assert!(err.to_string().contains("move_to"));

        let blank_target =
            GameAction::new("idle", Some("  ".into()), serde_json::Value::Null).unwrap();
        assert!(blank_target.target.is_none());
    }

    #[test]
    fn test_websocket_url_validation() {
        assert!(GameBridge::websocket("http://localhost:1").is_err());
        assert!(GameBridge::websocket("not a url").is_err());
        assert!(GameBridge::websocket("ws://localhost:9001/npc").is_ok());
    }

    #[tokio::test]
    async fn test_host_dispatch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = GameBridge::host(tx);
        let action = GameAction::new(
            "emote",
            Some("smith".into()),
            serde_json::json!({"emote": "wave"}),
        )
        .unwrap();
        bridge.dispatch(&action).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), action);

        drop(rx);
        assert!(bridge.dispatch(&action).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnected_dispatch_fails() {
        let action = GameAction::new("idle", None, serde_json::Value::Null).unwrap();
        let err = GameBridge::disconnected().dispatch(&action).await.unwrap_err();
        assert!(err.to_string().contains("No game is connected"));
    }

    #[tokio::test]
    async fn test_websocket_dispatch_reaches_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let WsMessage::Text(text) = msg {
                    let _ = seen_tx.send(text.as_str().to_string());
                }
            }
        });

        let bridge = GameBridge::websocket(&format!("ws://{}", addr)).unwrap();
        let action = GameAction::new(
            "move_to",
            Some("guard".into()),
            serde_json::json!({"x": 3, "y": 4}),
        )
        .unwrap();
        bridge.dispatch(&action).await.unwrap();
        bridge.dispatch(&action).await.unwrap();

        let first: GameAction = serde_json::from_str(&seen_rx.recv().await.unwrap()).unwrap();
        assert_eq!(first.action, "move_to");
        assert_eq!(first.payload["x"], 3);
        assert!(seen_rx.recv().await.is_some());
    }
}
