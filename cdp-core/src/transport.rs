//! Per-target CDP WebSocket client.
//!
//! Each attached page target gets its own connection to its
//! `webSocketDebuggerUrl`. A background receive task routes command replies
//! to their callers by id and forwards `Fetch.requestPaused` events into a
//! channel; the channel closing is the stream-death signal the session
//! manager acts on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::CdpError;
use crate::protocol::{CdpCommand, CdpMessage, RequestPausedEvent};
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// Safety net for command round-trips; callers impose tighter budgets.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

const PAUSED_EVENT_METHOD: &str = "Fetch.requestPaused";

/// A live CDP connection to one browser target.
pub struct TargetClient {
    ws_tx: tokio::sync::Mutex<WsSink>,
    next_id: AtomicU64,
    pending: Pending,
    recv_task: tokio::task::JoinHandle<()>,
}

impl TargetClient {
    /// Dial the target's debugger WebSocket. Returns the client plus the
    /// stream of paused events; the stream ends when the connection dies.
    pub async fn connect(
        ws_url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RequestPausedEvent>)> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
        let (ws_sink, ws_source) = ws_stream.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let recv_task = {
            let pending = pending.clone();
            tokio::spawn(async move {
                receive_loop(ws_source, pending, event_tx).await;
            })
        };

        debug!(url = ws_url, "target client connected");

        Ok((
            Self {
                ws_tx: tokio::sync::Mutex::new(ws_sink),
                next_id: AtomicU64::new(1),
                pending,
                recv_task,
            },
            event_rx,
        ))
    }

    /// Send one CDP command and wait for its reply.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let command = CdpCommand {
            id,
            method: method.to_string(),
            params,
        };
        let payload = serde_json::to_string(&command)?;
        trace!(%payload, "cdp send");

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        {
            let mut ws = self.ws_tx.lock().await;
            if let Err(err) = ws.send(Message::Text(payload.into())).await {
                self.pending.lock().remove(&id);
                return Err(err.into());
            }
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout(method.to_string()))
            }
        }
    }

    /// Close the connection and stop the receive task.
    pub async fn close(&self) {
        let mut ws = self.ws_tx.lock().await;
        let _ = ws.send(Message::Close(None)).await;
        self.recv_task.abort();
    }
}

impl Drop for TargetClient {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

async fn receive_loop(
    mut source: futures::stream::SplitStream<WsStream>,
    pending: Pending,
    event_tx: mpsc::UnboundedSender<RequestPausedEvent>,
) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                trace!(payload = %text, "cdp recv");
                let parsed: CdpMessage = match serde_json::from_str(&text) {
                    Ok(msg) => msg,
                    Err(err) => {
                        warn!(%err, "unparseable cdp frame");
                        continue;
                    }
                };
                if let Some(id) = parsed.id {
                    let Some(tx) = pending.lock().remove(&id) else {
                        continue;
                    };
                    let result = match parsed.error {
                        Some(err) => Err(CdpError::Protocol {
                            code: err.code,
                            message: err.message,
                        }),
                        None => Ok(parsed.result.unwrap_or(Value::Null)),
                    };
                    let _ = tx.send(result);
                } else if parsed.method.as_deref() == Some(PAUSED_EVENT_METHOD) {
                    let Some(params) = parsed.params else {
                        continue;
                    };
                    match serde_json::from_value::<RequestPausedEvent>(params) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                // Consumer gone; keep draining replies.
                                debug!("paused-event receiver dropped");
                            }
                        }
                        Err(err) => warn!(%err, "unparseable requestPaused payload"),
                    }
                }
            }
            Ok(Message::Close(_)) => {
                debug!("websocket closed by peer");
                break;
            }
            Err(err) => {
                warn!(%err, "websocket receive error");
                break;
            }
            _ => {}
        }
    }

    // Fail outstanding callers and end the event stream.
    pending.lock().clear();
}
