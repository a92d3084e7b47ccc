//! Websocket push listener for payload status events.
//!
//! # Design Decisions
//! - One reader task per subscription, forwarding parsed events into an mpsc channel
//! - The task ends when the socket closes or the receiver is dropped
//! - Unparseable frames are delivered as `PushEvent::Other` and ignored downstream

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::channels::types::PushEvent;
use crate::channels::PushListener;
use crate::error::{AdapterError, AdapterResult};

const EVENT_BUFFER: usize = 16;

#[derive(Debug, Default, Clone)]
pub struct WebSocketListener;

impl WebSocketListener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushListener for WebSocketListener {
    async fn subscribe(&self, url: &str) -> AdapterResult<mpsc::Receiver<PushEvent>> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| AdapterError::Http(format!("websocket connect failed: {}", e)))?;
        let (mut write, mut read) = ws.split();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let url = url.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = read.next() => {
                        let event = match frame {
                            Some(Ok(Message::Text(text))) => PushEvent::parse(&text),
                            Some(Ok(Message::Ping(data))) => {
                                let _ = write.send(Message::Pong(data)).await;
                                continue;
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                tracing::warn!(url = %url, error = %e, "Push channel read error");
                                break;
                            }
                        };
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            tracing::debug!(url = %url, "Push channel reader exited");
        });

        Ok(rx)
    }
}
