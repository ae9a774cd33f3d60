//! CDP client - one WebSocket to the browser
//!
//! 1. Requests are matched to responses by id
//! 2. Events fan out to per-method callbacks; callbacks must not block
//! 3. No retries. A failed command is reported to the caller, who decides.

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::protocol::*;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i32, message: String },

    #[error("Request {0} timed out")]
    Timeout(RequestId),

    #[error("Connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, CdpError>;

pub type EventCallback = Arc<dyn Fn(CdpEvent) + Send + Sync>;

pub struct CdpClient {
    next_id: AtomicU64,

    /// request id -> waiting caller
    pending: Arc<DashMap<RequestId, oneshot::Sender<CdpResponse>>>,

    /// method -> (subscription id, callback)
    subscribers: Arc<DashMap<String, Vec<(Uuid, EventCallback)>>>,

    sink: Mutex<WsSink>,

    request_timeout: Duration,

    /// Flips to true once the reader task has exited
    closed: watch::Receiver<bool>,

    shutdown: std::sync::Mutex<Option<oneshot::Sender<()>>>,
}

impl CdpClient {
    /// Connect to a browser-level WebSocket endpoint
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (closed_tx, closed_rx) = watch::channel(false);

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            subscribers: Arc::new(DashMap::new()),
            sink: Mutex::new(sink),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            closed: closed_rx,
            shutdown: std::sync::Mutex::new(Some(shutdown_tx)),
        });

        let pending = client.pending.clone();
        let subscribers = client.subscribers.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Err(e) = dispatch(&pending, &subscribers, &text) {
                                    tracing::error!("[CdpClient] Failed to handle message: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!("[CdpClient] WebSocket closed");
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::error!("[CdpClient] WebSocket error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("[CdpClient] Shutdown requested");
                        break;
                    }
                }
            }

            // Dropping the senders fails every in-flight request with Closed
            pending.clear();
            let _ = closed_tx.send(true);
        });

        tracing::info!("[CdpClient] Connected to {}", ws_url);
        Ok(client)
    }

    /// Send a command and wait for its result
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(CdpError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.into(),
            params,
            session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        let sent = self.sink.lock().await.send(Message::Text(json)).await;
        if let Err(e) = sent {
            self.pending.remove(&id);
            return Err(CdpError::WebSocket(e));
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(CdpError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                return Err(CdpError::Timeout(id));
            }
        };

        if let Some(error) = response.error {
            return Err(CdpError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Register a callback for one event method; returns its subscription id
    pub fn subscribe(&self, method: impl Into<String>, callback: EventCallback) -> Uuid {
        let id = Uuid::now_v7();
        self.subscribers
            .entry(method.into())
            .or_default()
            .push((id, callback));
        id
    }

    pub fn unsubscribe(&self, method: &str, id: Uuid) {
        if let Some(mut callbacks) = self.subscribers.get_mut(method) {
            callbacks.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    /// All targets the browser knows about
    pub async fn get_targets(&self) -> Result<Vec<TargetInfo>> {
        let result = self
            .send_request("Target.getTargets", Some(json!({})), None)
            .await?;
        Ok(serde_json::from_value(result["targetInfos"].clone())?)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve once the connection is gone
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        // Err means the reader task is gone, which is also closed
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Close the socket and stop the reader task
    pub async fn close(&self) -> Result<()> {
        let shutdown = match self.shutdown.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }
        self.sink.lock().await.close().await?;
        Ok(())
    }
}

/// Route one incoming text frame
fn dispatch(
    pending: &DashMap<RequestId, oneshot::Sender<CdpResponse>>,
    subscribers: &DashMap<String, Vec<(Uuid, EventCallback)>>,
    text: &str,
) -> Result<()> {
    match serde_json::from_str::<CdpMessage>(text)? {
        CdpMessage::Response(response) => {
            if let Some((_, tx)) = pending.remove(&response.id) {
                let _ = tx.send(response); // caller gave up
            } else {
                tracing::warn!("[CdpClient] Response for unknown request: {}", response.id);
            }
        }
        CdpMessage::Event(event) => {
            // Clone the callbacks out so none runs under the map's shard lock
            let callbacks: Vec<EventCallback> = match subscribers.get(&event.method) {
                Some(entry) => entry.value().iter().map(|(_, cb)| cb.clone()).collect(),
                None => return Ok(()),
            };
            for callback in callbacks {
                callback(event.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_dispatch_routes_response_to_waiter() {
        let pending = DashMap::new();
        let subscribers = DashMap::new();
        let (tx, mut rx) = oneshot::channel();
        pending.insert(3, tx);

        dispatch(&pending, &subscribers, r#"{"id":3,"result":{"ok":true}}"#).unwrap();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.result.unwrap()["ok"], true);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_dispatch_fans_out_events_by_method() {
        let pending = DashMap::new();
        let subscribers: DashMap<String, Vec<(Uuid, EventCallback)>> = DashMap::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let callback: EventCallback = Arc::new(move |_event: CdpEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        subscribers
            .entry(events::CHILD_NODE_INSERTED.to_string())
            .or_default()
            .push((Uuid::now_v7(), callback));

        dispatch(
            &pending,
            &subscribers,
            r#"{"method":"DOM.childNodeInserted","params":{},"sessionId":"S"}"#,
        )
        .unwrap();
        dispatch(
            &pending,
            &subscribers,
            r#"{"method":"DOM.childNodeRemoved","params":{}}"#,
        )
        .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_rejects_garbage() {
        let pending = DashMap::new();
        let subscribers = DashMap::new();
        assert!(matches!(
            dispatch(&pending, &subscribers, "not json"),
            Err(CdpError::Json(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Needs running Chrome
    async fn test_connect() {
        let client = CdpClient::connect("ws://localhost:9222/devtools/browser")
            .await
            .unwrap();

        let targets = client.get_targets().await.unwrap();
        println!("Targets: {:?}", targets);

        client.close().await.unwrap();
    }
}
