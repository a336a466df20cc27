//! Signaling channel: one websocket connection, text frames in and out.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use streamview_common::TransportError;
use tokio::sync::{mpsc, Notify};
use tokio::time::{self, Instant, Interval};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, info, warn};
use url::Url;

/// Sending half of the signaling channel.
///
/// Sends after the connection has gone away are dropped, so a negotiation
/// step that completes after teardown can still "send" without faulting.
#[derive(Clone, Debug)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbound {
    /// Queue a frame. Returns `false` if the channel is already closed.
    pub fn send(&self, text: String) -> bool {
        if self.tx.send(text).is_err() {
            debug!("signaling channel closed; dropping outbound frame");
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of the signaling channel.
#[derive(Debug)]
pub struct Inbound {
    rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

impl Inbound {
    /// Next text frame. `None` once the connection closed cleanly.
    pub async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await
    }
}

/// The far end of an in-memory channel built by [`memory`].
#[derive(Debug)]
pub struct MemoryRemote {
    /// Frames the local side sent.
    pub sent: mpsc::UnboundedReceiver<String>,
    /// Feed frames (or a transport failure) to the local side.
    pub inject: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MemoryRemote {
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.inject.send(Ok(frame.into())).is_ok()
    }
}

/// An in-process channel with no socket underneath.
pub fn memory() -> (Outbound, Inbound, MemoryRemote) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    (
        Outbound { tx: out_tx },
        Inbound { rx: in_rx },
        MemoryRemote {
            sent: out_rx,
            inject: in_tx,
        },
    )
}

/// Open the websocket and start its reader and writer tasks.
///
/// `greeting`, when set, is the first frame written. `keepalive` sends a
/// ping once the connection has been idle that long in both directions, so
/// routers keep it open.
pub async fn connect(
    url: &Url,
    keepalive: Option<Duration>,
    greeting: Option<String>,
) -> Result<(Outbound, Inbound), TransportError> {
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| TransportError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    info!(%url, "connected to signaling server");

    let (mut write, mut read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    if let Some(greeting) = greeting {
        let _ = out_tx.send(greeting);
    }

    let activity = Arc::new(Notify::new());
    let read_activity = activity.clone();

    tokio::spawn(async move {
        let mut keepalive = Keepalive::new(keepalive);
        loop {
            tokio::select! {
                frame = out_rx.recv() => {
                    let Some(text) = frame else { break };
                    if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                        warn!(error = %e, "failed to send signaling message");
                        break;
                    }
                    keepalive.touch();
                }
                _ = activity.notified() => keepalive.touch(),
                _ = keepalive.tick() => {
                    if let Err(e) = write.send(WsMessage::Ping(Bytes::new())).await {
                        warn!(error = %e, "keepalive ping failed");
                        break;
                    }
                }
            }
        }
        let _ = write.close().await;
    });

    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            if msg.is_ok() {
                read_activity.notify_one();
            }
            match msg {
                Ok(WsMessage::Text(text)) => {
                    if in_tx.send(Ok(text.as_str().to_owned())).is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Close(frame)) => {
                    debug!(?frame, "signaling server closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = in_tx.send(Err(TransportError::WebSocket(e.to_string())));
                    break;
                }
            }
        }
    });

    Ok((Outbound { tx: out_tx }, Inbound { rx: in_rx }))
}

/// Idle timer for websocket pings. Fires one period after the last traffic.
struct Keepalive {
    interval: Option<Interval>,
}

impl Keepalive {
    fn new(period: Option<Duration>) -> Self {
        Self {
            interval: period.map(|period| time::interval_at(Instant::now() + period, period)),
        }
    }

    /// Record traffic; the next ping is a full period away.
    fn touch(&mut self) {
        if let Some(interval) = self.interval.as_mut() {
            interval.reset();
        }
    }

    /// Resolves when a ping is due. Never resolves when disabled.
    async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => future::pending().await,
        }
    }
}
