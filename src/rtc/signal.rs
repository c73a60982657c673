use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{AppError, Result};
use crate::ws::{ClientEvent, ServerEvent};

/// Typed signaling transport for native endpoints: a WebSocket client
/// speaking the coordinator's event enums. The URL carries the bearer
/// credential, e.g. `ws://host:8080/ws?token=...`.
pub struct SignalingChannel {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    inbound: mpsc::UnboundedReceiver<ServerEvent>,
}

impl SignalingChannel {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| AppError::Internal(format!("WebSocket connect failed: {}", e)))?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerEvent>();

        // Outgoing events
        tokio::spawn(async move {
            while let Some(event) = out_rx.recv().await {
                let Ok(json) = serde_json::to_string(&event) else {
                    continue;
                };
                if write.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        });

        // Incoming events
        tokio::spawn(async move {
            while let Some(Ok(msg)) = read.next().await {
                if let Message::Text(text) = msg {
                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        Ok(event) => {
                            if in_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Unrecognized server event");
                        }
                    }
                }
            }
        });

        Ok(Self {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    /// Clone of the outbound sender, e.g. for wiring into a [`super::Negotiator`].
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.outbound.clone()
    }

    pub fn send(&self, event: ClientEvent) -> Result<()> {
        self.outbound
            .send(event)
            .map_err(|_| AppError::Internal("Signaling channel closed".to_string()))
    }

    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.inbound.recv().await
    }
}
