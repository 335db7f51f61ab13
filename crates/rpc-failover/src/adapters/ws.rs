//! WebSocket JSON-RPC transport.
//!
//! One handle owns one socket. A writer task drains the outbound queue and
//! a reader task correlates responses and routes subscription
//! notifications. When the socket goes away every waiting request fails,
//! every event feed closes and the handle's lifecycle reports
//! `Disconnected`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::pending::{subscription_key, EventSender, PendingRequests};
use crate::domain::{ConfigError, Endpoint, LinkSignal, RawEvent, TransportError, WsTransportConfig};
use crate::ports::{Transport, TransportHandle};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Incoming JSON-RPC frame: either a response or a notification.
#[derive(Debug, Deserialize)]
struct Frame {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RpcErrorBody>,
    method: Option<String>,
    params: Option<NotificationParams>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: Value,
    result: Value,
}

/// Opens WebSocket JSON-RPC connections.
#[derive(Debug, Clone)]
pub struct WsTransport {
    config: Arc<WsTransportConfig>,
}

impl WsTransport {
    pub fn new(config: WsTransportConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &WsTransportConfig {
        &self.config
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            config: Arc::new(WsTransportConfig::default()),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Handle = WsHandle;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<WsHandle>, TransportError> {
        debug!(endpoint = %endpoint, "Opening WebSocket");
        let (socket, _response) = timeout(
            self.config.connect_timeout,
            connect_async(endpoint.as_str()),
        )
        .await
        .map_err(|_| TransportError::timeout(format!("connect to {endpoint}")))?
        .map_err(|e| TransportError::connect(endpoint, e))?;

        info!(endpoint = %endpoint, "WebSocket connected");
        Ok(Arc::new(WsHandle::start(
            endpoint.clone(),
            socket,
            self.config.clone(),
        )))
    }
}

/// State shared between a handle and its I/O tasks.
struct Shared {
    endpoint: Endpoint,
    pending: PendingRequests,
    connected: AtomicBool,
    lifecycle: watch::Sender<LinkSignal>,
}

impl Shared {
    /// First caller wins; later calls are no-ops.
    fn mark_disconnected(&self, reason: &str) -> bool {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return false;
        }
        let failed = self.pending.fail_all(TransportError::Disconnected);
        info!(endpoint = %self.endpoint, reason, failed_requests = failed, "WebSocket disconnected");
        self.lifecycle.send_replace(LinkSignal::Disconnected);
        true
    }
}

/// Live WebSocket connection.
pub struct WsHandle {
    shared: Arc<Shared>,
    config: Arc<WsTransportConfig>,
    outbound: mpsc::Sender<Message>,
    next_id: AtomicU64,
    subscription: Mutex<Option<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WsHandle {
    fn start(endpoint: Endpoint, socket: Socket, config: Arc<WsTransportConfig>) -> Self {
        let (lifecycle, _) = watch::channel(LinkSignal::Ready);
        let shared = Arc::new(Shared {
            endpoint,
            pending: PendingRequests::new(),
            connected: AtomicBool::new(true),
            lifecycle,
        });

        let (sink, stream) = socket.split();
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_buffer);

        let writer = tokio::spawn(write_loop(sink, outbound_rx, shared.clone()));
        let reader = tokio::spawn(read_loop(stream, shared.clone(), config.clone()));

        Self {
            shared,
            config,
            outbound,
            next_id: AtomicU64::new(1),
            subscription: Mutex::new(None),
            tasks: Mutex::new(vec![writer, reader]),
        }
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.pending_count()
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        subscription: Option<EventSender>,
    ) -> Result<Value, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self.shared.pending.register(id, method, subscription);

        // The reader may have failed everything between the check and the
        // registration.
        if !self.is_connected() {
            self.shared.pending.cancel(id);
            return Err(TransportError::Disconnected);
        }

        let params = if params.is_null() { json!([]) } else { params };
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if self
            .outbound
            .send(Message::Text(frame.to_string().into()))
            .await
            .is_err()
        {
            self.shared.pending.cancel(id);
            return Err(TransportError::Disconnected);
        }

        match timeout(self.config.request_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => {
                self.shared.pending.cancel(id);
                Err(TransportError::timeout(method))
            }
        }
    }
}

#[async_trait]
impl TransportHandle for WsHandle {
    fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn lifecycle(&self) -> watch::Receiver<LinkSignal> {
        self.shared.lifecycle.subscribe()
    }

    async fn subscribe_events(
        &self,
        buffer: usize,
    ) -> Result<mpsc::Receiver<Vec<RawEvent>>, TransportError> {
        let (tx, rx) = mpsc::channel(buffer);
        let id = self
            .call(&self.config.subscribe_method, json!([]), Some(tx))
            .await?;
        if let Some(key) = subscription_key(&id) {
            debug!(endpoint = %self.shared.endpoint, subscription = %key, "Event feed subscribed");
            *self.subscription.lock() = Some(key);
        }
        Ok(rx)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.call(method, params, None).await
    }

    async fn disconnect(&self) {
        if !self.is_connected() {
            return;
        }

        // Best effort: the socket is closed right after, so nobody waits
        // for the answer.
        if let Some(key) = self.subscription.lock().take() {
            self.shared.pending.remove_subscription(&key);
            let frame = json!({
                "jsonrpc": "2.0",
                "id": self.next_id.fetch_add(1, Ordering::Relaxed),
                "method": self.config.unsubscribe_method,
                "params": [key],
            });
            let _ = self
                .outbound
                .try_send(Message::Text(frame.to_string().into()));
        }
        let _ = self.outbound.try_send(Message::Close(None));

        self.shared.mark_disconnected("closed locally");
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<Socket, Message>,
    mut outbound: mpsc::Receiver<Message>,
    shared: Arc<Shared>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            warn!(endpoint = %shared.endpoint, error = %e, "WebSocket write failed");
            shared.mark_disconnected("write failed");
            return;
        }
        if closing {
            return;
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<Socket>,
    shared: Arc<Shared>,
    config: Arc<WsTransportConfig>,
) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => handle_text(&text, &shared, &config).await,
            Some(Ok(Message::Close(frame))) => {
                debug!(endpoint = %shared.endpoint, ?frame, "Close frame received");
                break "closed by remote";
            }
            // Pings are answered by tungstenite itself.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(endpoint = %shared.endpoint, error = %e, "WebSocket read failed");
                shared.lifecycle.send_replace(LinkSignal::Error(e.to_string()));
                break "read failed";
            }
            None => break "stream ended",
        }
    };
    shared.mark_disconnected(reason);
}

async fn handle_text(text: &str, shared: &Shared, config: &WsTransportConfig) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(endpoint = %shared.endpoint, error = %e, "Unparseable frame");
            return;
        }
    };

    if let Some(id) = frame.id {
        let result = match frame.error {
            Some(err) => Err(TransportError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(frame.result.unwrap_or(Value::Null)),
        };
        shared.pending.complete(id, result);
        return;
    }

    if frame.method.as_deref() != Some(config.notification_method.as_str()) {
        debug!(method = ?frame.method, "Ignoring notification");
        return;
    }
    let Some(params) = frame.params else {
        warn!(endpoint = %shared.endpoint, "Notification without params");
        return;
    };
    let Some(key) = subscription_key(&params.subscription) else {
        warn!(endpoint = %shared.endpoint, "Notification without subscription id");
        return;
    };
    let Some(events) = shared.pending.subscriber(&key) else {
        debug!(subscription = %key, "Notification for unknown subscription");
        return;
    };

    let batch = decode_batch(params.result);
    if events.send(batch).await.is_err() {
        debug!(subscription = %key, "Event receiver dropped");
        shared.pending.remove_subscription(&key);
    }
}

/// Records that do not look like events are skipped, the rest of the
/// block is kept.
fn decode_batch(result: Value) -> Vec<RawEvent> {
    let records = match result {
        Value::Array(records) => records,
        other => vec![other],
    };
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<RawEvent>(record) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(error = %e, "Skipping undecodable event record");
                None
            }
        })
        .collect()
}
