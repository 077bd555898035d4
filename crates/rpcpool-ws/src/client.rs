//! WebSocket JSON-RPC client with auto-reconnect and subscription management.
//!
//! A background task owns the socket. Callers talk to it through a command
//! channel; the task rewrites request ids to its own wire ids, so requests
//! from different borrowers and from subscription handles never collide on
//! one connection.
//!
//! The task runs until [`WsRpcClient::close`] is called or every sender of
//! its command channel is gone: the client itself and each live
//! [`SubscriptionHandle`]. Dropping the client while subscriptions are live
//! therefore keeps their connection open.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use rpcpool_core::error::TransportError;
use rpcpool_core::request::{
    JsonRpcRequest, JsonRpcResponse, RpcId, SubscriptionNotification, SUBSCRIPTION_NOTIFICATION,
};
use rpcpool_core::subscription::{EventCallback, SubscriptionHandle, SubscriptionId};
use rpcpool_core::transport::{HealthStatus, PubSubTransport, RpcTransport};

use crate::subscriptions::SubscriptionManager;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ResponseSender = oneshot::Sender<Result<JsonRpcResponse, TransportError>>;
type SubscribeSender = oneshot::Sender<Result<SubscriptionId, TransportError>>;

/// Configuration for the WebSocket client.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Timeout for one handshake attempt.
    pub connect_timeout: Duration,
    /// How long a caller waits for a response; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Some(Duration::from_secs(30)),
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

/// Command sent from callers to the background WS task.
enum WsCommand {
    Send {
        req: JsonRpcRequest,
        tx: ResponseSender,
    },
    Subscribe {
        local: u64,
        params: Vec<Value>,
        callback: EventCallback,
        tx: SubscribeSender,
    },
    Close,
}

const CONNECTED: u8 = 0;
const RECONNECTING: u8 = 1;
const CLOSED: u8 = 2;

/// WebSocket JSON-RPC client.
///
/// Maintains a background task that owns the WebSocket connection and
/// handles reconnect + re-subscribe logic transparently.
pub struct WsRpcClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    subscriptions: SubscriptionManager,
    state: Arc<AtomicU8>,
    request_timeout: Option<Duration>,
}

impl WsRpcClient {
    /// Connect to `url`, sending `headers` with the handshake, and start the
    /// background task.
    ///
    /// A failed handshake is a retryable `WebSocket` error.
    pub async fn connect(
        url: impl Into<String>,
        headers: &BTreeMap<String, String>,
        config: WsClientConfig,
    ) -> Result<Self, TransportError> {
        let url = url.into();
        let first = open(&url, headers, config.connect_timeout).await?;
        tracing::debug!(url = %url, "WebSocket connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WsCommand>();
        let subscriptions = SubscriptionManager::new();
        let state = Arc::new(AtomicU8::new(CONNECTED));
        let request_timeout = config.request_timeout;

        let task = WsTask {
            url: url.clone(),
            headers: headers.clone(),
            config,
            state: state.clone(),
            dispatcher: Dispatcher::new(subscriptions.clone()),
        };
        tokio::spawn(task.run(first, cmd_rx));

        Ok(Self {
            url,
            cmd_tx,
            subscriptions,
            state,
            request_timeout,
        })
    }

    /// Number of subscriptions currently registered on this connection.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[async_trait]
impl RpcTransport for WsRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        request(&self.cmd_tx, req, self.request_timeout).await
    }

    fn health(&self) -> HealthStatus {
        match self.state.load(Ordering::Acquire) {
            CONNECTED => HealthStatus::Healthy,
            RECONNECTING => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn as_pubsub(&self) -> Option<&dyn PubSubTransport> {
        Some(self)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.store(CLOSED, Ordering::Release);
        // task already gone means already closed
        let _ = self.cmd_tx.send(WsCommand::Close);
        Ok(())
    }
}

#[async_trait]
impl PubSubTransport for WsRpcClient {
    async fn subscribe(
        &self,
        method: &str,
        params: Value,
        on_event: EventCallback,
    ) -> Result<SubscriptionHandle, TransportError> {
        let local = self.subscriptions.reserve();
        let mut wire_params = vec![Value::String(method.to_string())];
        if !params.is_null() {
            wire_params.push(params);
        }

        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Subscribe {
                local,
                params: wire_params,
                callback: on_event,
                tx,
            })
            .map_err(|_| TransportError::WebSocket("WS task closed".into()))?;
        let remote = await_reply(rx, self.request_timeout).await?;
        tracing::debug!(url = %self.url, subscription = %remote, kind = method, "subscribed");

        let cmd_tx = self.cmd_tx.clone();
        let subscriptions = self.subscriptions.clone();
        let timeout = self.request_timeout;
        Ok(SubscriptionHandle::new(remote, move || {
            Box::pin(unsubscribe(cmd_tx, subscriptions, local, timeout))
        }))
    }
}

async fn request(
    cmd_tx: &mpsc::UnboundedSender<WsCommand>,
    req: JsonRpcRequest,
    timeout: Option<Duration>,
) -> Result<JsonRpcResponse, TransportError> {
    let (tx, rx) = oneshot::channel();
    cmd_tx
        .send(WsCommand::Send { req, tx })
        .map_err(|_| TransportError::WebSocket("WS task closed".into()))?;
    await_reply(rx, timeout).await
}

async fn await_reply<T>(
    rx: oneshot::Receiver<Result<T, TransportError>>,
    timeout: Option<Duration>,
) -> Result<T, TransportError> {
    let reply = match timeout {
        Some(limit) => time::timeout(limit, rx).await.map_err(|_| TransportError::Timeout {
            ms: limit.as_millis() as u64,
        })?,
        None => rx.await,
    };
    reply.map_err(|_| TransportError::WebSocket("WS response dropped".into()))?
}

/// Cancel path of a [`SubscriptionHandle`]. The callback is detached before
/// `eth_unsubscribe` goes out. A subscription caught mid re-subscribe is
/// unsubscribed by the connection task instead.
async fn unsubscribe(
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    subscriptions: SubscriptionManager,
    local: u64,
    timeout: Option<Duration>,
) -> Result<(), TransportError> {
    let Some(remote) = subscriptions.remove(local) else {
        return Ok(());
    };
    let req = JsonRpcRequest::new(0, "eth_unsubscribe", vec![Value::String(remote.0.clone())]);
    match request(&cmd_tx, req, timeout).await {
        Ok(resp) => {
            resp.into_result().map_err(TransportError::Rpc)?;
            tracing::debug!(subscription = %remote, "unsubscribed");
            Ok(())
        }
        // connection is gone, and the subscription with it
        Err(TransportError::WebSocket(reason)) => {
            tracing::debug!(subscription = %remote, reason = %reason, "unsubscribe skipped");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Build the handshake request carrying the endpoint headers.
fn handshake_request(url: &str, headers: &BTreeMap<String, String>) -> Result<Request, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Other(format!("invalid WebSocket URL {url}: {e}")))?;
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(format!("{name}: {value}")))?;
        request.headers_mut().insert(name, value);
    }
    Ok(request)
}

async fn open(
    url: &str,
    headers: &BTreeMap<String, String>,
    connect_timeout: Duration,
) -> Result<WsStream, TransportError> {
    let request = handshake_request(url, headers)?;
    let (ws, _) = time::timeout(connect_timeout, tokio_tungstenite::connect_async(request))
        .await
        .map_err(|_| TransportError::Timeout {
            ms: connect_timeout.as_millis() as u64,
        })?
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;
    Ok(ws)
}

/// A request the task is waiting on, keyed by wire id.
enum Pending {
    Call {
        original: RpcId,
        tx: ResponseSender,
    },
    Subscribe {
        local: u64,
        params: Vec<Value>,
        callback: EventCallback,
        tx: SubscribeSender,
    },
    Resubscribe {
        local: u64,
    },
    /// Fire-and-forget request; the response is ignored.
    Discard,
}

/// Connection-independent state of the background task.
struct Dispatcher {
    next_id: u64,
    pending: HashMap<u64, Pending>,
    subscriptions: SubscriptionManager,
}

impl Dispatcher {
    fn new(subscriptions: SubscriptionManager) -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
            subscriptions,
        }
    }

    /// Register a pending entry and return the serialized wire request.
    fn track(&mut self, method: &str, params: Vec<Value>, pending: Pending) -> Option<String> {
        self.next_id += 1;
        let id = self.next_id;
        let req = JsonRpcRequest::new(id, method, params);
        match serde_json::to_string(&req) {
            Ok(frame) => {
                self.pending.insert(id, pending);
                Some(frame)
            }
            Err(e) => {
                fail(pending, TransportError::Deserialization(e));
                None
            }
        }
    }

    /// Turn a caller command into a wire frame. `None` for `Close`.
    fn frame(&mut self, cmd: WsCommand) -> Option<String> {
        match cmd {
            WsCommand::Send { req, tx } => {
                let JsonRpcRequest {
                    method, params, id, ..
                } = req;
                self.track(&method, params, Pending::Call { original: id, tx })
            }
            WsCommand::Subscribe {
                local,
                params,
                callback,
                tx,
            } => self.track(
                "eth_subscribe",
                params.clone(),
                Pending::Subscribe {
                    local,
                    params,
                    callback,
                    tx,
                },
            ),
            WsCommand::Close => None,
        }
    }

    /// Frames re-establishing every live subscription on a fresh connection.
    fn resubscribe_frames(&mut self) -> Vec<String> {
        self.subscriptions
            .begin_resubscribe()
            .into_iter()
            .filter_map(|(local, params)| {
                self.track("eth_subscribe", params, Pending::Resubscribe { local })
            })
            .collect()
    }

    /// `eth_unsubscribe` for a subscription the node confirmed but nobody
    /// holds a handle to.
    fn orphan_frame(&mut self, remote: SubscriptionId) -> Option<String> {
        tracing::debug!(subscription = %remote, "unsubscribing orphaned subscription");
        self.track("eth_unsubscribe", vec![Value::String(remote.0)], Pending::Discard)
    }

    /// Process one inbound message. Returns a frame to send back, if any.
    fn handle_message(&mut self, text: &str) -> Option<String> {
        let Ok(val) = serde_json::from_str::<Value>(text) else {
            tracing::debug!("failed to parse WS message as JSON");
            return None;
        };

        if val.get("method").and_then(|m| m.as_str()) == Some(SUBSCRIPTION_NOTIFICATION) {
            match serde_json::from_value::<SubscriptionNotification>(val["params"].clone()) {
                Ok(note) => {
                    let id = SubscriptionId(note.subscription);
                    if !self.subscriptions.dispatch(&id, &note.result) {
                        tracing::trace!(subscription = %id, "push for unknown subscription");
                    }
                }
                Err(e) => tracing::debug!(error = %e, "malformed subscription notification"),
            }
            return None;
        }

        let Ok(resp) = serde_json::from_value::<JsonRpcResponse>(val) else {
            tracing::debug!("ignoring unrecognised WS message");
            return None;
        };
        let pending = resp.id.as_number().and_then(|id| self.pending.remove(&id))?;

        match pending {
            Pending::Call { original, tx } => {
                let mut resp = resp;
                resp.id = original;
                let _ = tx.send(Ok(resp));
                None
            }
            Pending::Subscribe {
                local,
                params,
                callback,
                tx,
            } => {
                let outcome = match resp.into_result() {
                    Ok(Value::String(remote)) => {
                        let remote = SubscriptionId(remote);
                        self.subscriptions.insert(local, remote.clone(), params, callback);
                        Ok(remote)
                    }
                    Ok(other) => Err(TransportError::Other(format!(
                        "unexpected subscription id: {other}"
                    ))),
                    Err(e) => Err(TransportError::Rpc(e)),
                };
                let confirmed = outcome.as_ref().ok().cloned();
                match (tx.send(outcome), confirmed) {
                    // caller gave up waiting; its handle never existed
                    (Err(_), Some(remote)) => {
                        self.subscriptions.remove(local);
                        self.orphan_frame(remote)
                    }
                    _ => None,
                }
            }
            Pending::Resubscribe { local } => match resp.into_result() {
                Ok(Value::String(remote)) => {
                    let remote = SubscriptionId(remote);
                    if self.subscriptions.rekey(local, remote.clone()) {
                        tracing::debug!(subscription = %remote, "resubscribed");
                        None
                    } else {
                        // cancelled while the re-subscribe was in flight
                        self.orphan_frame(remote)
                    }
                }
                other => {
                    tracing::warn!(local, result = ?other, "resubscribe failed, dropping subscription");
                    self.subscriptions.remove(local);
                    None
                }
            },
            Pending::Discard => None,
        }
    }

    /// Fail every in-flight request; subscriptions stay for the next connection.
    fn fail_pending(&mut self, reason: &str) {
        for (_, pending) in self.pending.drain() {
            fail(pending, TransportError::WebSocket(reason.to_string()));
        }
    }
}

fn fail(pending: Pending, err: TransportError) {
    match pending {
        Pending::Call { tx, .. } => {
            let _ = tx.send(Err(err));
        }
        Pending::Subscribe { tx, .. } => {
            let _ = tx.send(Err(err));
        }
        Pending::Resubscribe { .. } | Pending::Discard => {}
    }
}

fn reject(cmd: WsCommand, reason: &str) {
    let err = TransportError::WebSocket(reason.to_string());
    match cmd {
        WsCommand::Send { tx, .. } => {
            let _ = tx.send(Err(err));
        }
        WsCommand::Subscribe { tx, .. } => {
            let _ = tx.send(Err(err));
        }
        WsCommand::Close => {}
    }
}

enum Exit {
    Closed,
    Disconnected,
}

/// Marks the transport closed when the connection task ends, however it ends.
struct ClosedOnExit(Arc<AtomicU8>);

impl Drop for ClosedOnExit {
    fn drop(&mut self) {
        self.0.store(CLOSED, Ordering::Release);
    }
}

/// Background task that owns the WebSocket connection.
struct WsTask {
    url: String,
    headers: BTreeMap<String, String>,
    config: WsClientConfig,
    state: Arc<AtomicU8>,
    dispatcher: Dispatcher,
}

impl WsTask {
    async fn run(mut self, first: WsStream, mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>) {
        let _closed = ClosedOnExit(self.state.clone());
        let mut stream = Some(first);
        let mut backoff = self.config.reconnect_initial;

        loop {
            let ws = match stream.take() {
                Some(ws) => ws,
                None => {
                    self.state.store(RECONNECTING, Ordering::Release);
                    tracing::warn!(url = %self.url, "WS disconnected, reconnecting in {backoff:?}");
                    if !wait_backoff(&mut cmd_rx, backoff).await {
                        break;
                    }
                    match open(&self.url, &self.headers, self.config.connect_timeout).await {
                        Ok(ws) => {
                            backoff = self.config.reconnect_initial;
                            tracing::info!(url = %self.url, "WS reconnected");
                            ws
                        }
                        Err(e) => {
                            tracing::warn!(url = %self.url, error = %e, "WS reconnect failed");
                            backoff = (backoff * 2).min(self.config.reconnect_max);
                            continue;
                        }
                    }
                }
            };

            self.state.store(CONNECTED, Ordering::Release);
            match self.serve(ws, &mut cmd_rx).await {
                Exit::Closed => break,
                Exit::Disconnected => self.dispatcher.fail_pending("connection lost"),
            }
        }

        self.dispatcher.fail_pending("transport closed");
        tracing::debug!(url = %self.url, "WS task stopped");
    }

    /// Pump one connection until it drops or the client closes.
    async fn serve(
        &mut self,
        ws: WsStream,
        cmd_rx: &mut mpsc::UnboundedReceiver<WsCommand>,
    ) -> Exit {
        let (mut sink, mut source) = ws.split();

        for frame in self.dispatcher.resubscribe_frames() {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                return Exit::Disconnected;
            }
        }

        loop {
            tokio::select! {
                // Incoming commands from callers
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        let _ = sink.close().await;
                        return Exit::Closed;
                    };
                    match self.dispatcher.frame(cmd) {
                        Some(frame) => {
                            if sink.send(Message::Text(frame.into())).await.is_err() {
                                return Exit::Disconnected;
                            }
                        }
                        None => {
                            let _ = sink.close().await;
                            return Exit::Closed;
                        }
                    }
                }
                // Incoming messages from node
                msg = source.next() => {
                    match msg {
                        None => return Exit::Disconnected,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WS receive error");
                            return Exit::Disconnected;
                        }
                        Some(Ok(Message::Text(text))) => {
                            if let Some(frame) = self.dispatcher.handle_message(text.as_str()) {
                                if sink.send(Message::Text(frame.into())).await.is_err() {
                                    return Exit::Disconnected;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) => return Exit::Disconnected,
                        _ => {}
                    }
                }
            }
        }
    }
}

/// Sleep out the reconnect backoff, rejecting commands that arrive meanwhile.
/// Returns `false` if the client closed.
async fn wait_backoff(cmd_rx: &mut mpsc::UnboundedReceiver<WsCommand>, delay: Duration) -> bool {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                None | Some(WsCommand::Close) => return false,
                Some(cmd) => reject(cmd, "reconnecting"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(SubscriptionManager::new())
    }

    #[test]
    fn handshake_request_carries_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        let req = handshake_request("ws://127.0.0.1:8546", &headers).unwrap();
        assert_eq!(req.headers()["x-api-key"], "secret");
    }

    #[test]
    fn handshake_request_rejects_bad_header() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Api-Key".to_string(), "a\nb".to_string());
        let err = handshake_request("ws://127.0.0.1:8546", &headers).unwrap_err();
        assert!(matches!(err, TransportError::InvalidHeader(_)));
    }

    #[test]
    fn response_id_is_restored() {
        let mut d = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        let frame = d
            .frame(WsCommand::Send {
                req: JsonRpcRequest::new(42, "eth_chainId", vec![]),
                tx,
            })
            .unwrap();
        let wire: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(wire["id"], 1);

        d.handle_message(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#);
        let resp = rx.try_recv().unwrap().unwrap();
        assert_eq!(resp.id, RpcId::Number(42));
        assert_eq!(resp.result, Some(Value::from("0x1")));
    }

    #[test]
    fn subscribe_response_registers_before_first_push() {
        let mut d = dispatcher();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let (tx, mut rx) = oneshot::channel();
        let local = d.subscriptions.reserve();
        d.frame(WsCommand::Subscribe {
            local,
            params: vec![Value::from("newHeads")],
            callback: Arc::new(move |b: Vec<u8>| sink.lock().unwrap().push(b)),
            tx,
        })
        .unwrap();

        // response and first push arrive back to back
        d.handle_message(r#"{"jsonrpc":"2.0","id":1,"result":"0xabc"}"#);
        d.handle_message(
            r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xabc","result":{"number":"0x2"}}}"#,
        );

        assert_eq!(rx.try_recv().unwrap().unwrap(), SubscriptionId("0xabc".into()));
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn rejected_subscribe_surfaces_rpc_error() {
        let mut d = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        let local = d.subscriptions.reserve();
        d.frame(WsCommand::Subscribe {
            local,
            params: vec![Value::from("bogus")],
            callback: Arc::new(|_: Vec<u8>| {}),
            tx,
        })
        .unwrap();
        d.handle_message(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"invalid params"}}"#,
        );
        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Rpc(ref e) if e.code == -32602));
        assert!(d.subscriptions.is_empty());
    }

    #[test]
    fn disconnect_fails_pending_calls() {
        let mut d = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        d.frame(WsCommand::Send {
            req: JsonRpcRequest::new(1, "eth_blockNumber", vec![]),
            tx,
        })
        .unwrap();
        d.fail_pending("connection lost");
        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(err.is_retryable());
        assert!(d.pending.is_empty());
    }

    #[test]
    fn resubscribe_rekeys_live_subscriptions() {
        let mut d = dispatcher();
        let local = d.subscriptions.reserve();
        d.subscriptions.insert(
            local,
            "0xold".into(),
            vec![Value::from("newHeads")],
            Arc::new(|_: Vec<u8>| {}),
        );

        let frames = d.resubscribe_frames();
        assert_eq!(frames.len(), 1);
        let wire: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(wire["method"], "eth_subscribe");
        assert_eq!(wire["params"][0], "newHeads");

        d.handle_message(&format!(
            r#"{{"jsonrpc":"2.0","id":{},"result":"0xnew"}}"#,
            wire["id"]
        ));
        assert_eq!(d.subscriptions.remove(local), Some("0xnew".into()));
    }

    #[test]
    fn abandoned_subscribe_is_unsubscribed() {
        let mut d = dispatcher();
        let (tx, rx) = oneshot::channel();
        let local = d.subscriptions.reserve();
        d.frame(WsCommand::Subscribe {
            local,
            params: vec![Value::from("newHeads")],
            callback: Arc::new(|_: Vec<u8>| {}),
            tx,
        })
        .unwrap();
        // caller timed out before the node answered
        drop(rx);

        let frame = d
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"result":"0xabc"}"#)
            .unwrap();
        let wire: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(wire["method"], "eth_unsubscribe");
        assert_eq!(wire["params"], serde_json::json!(["0xabc"]));
        assert!(d.subscriptions.is_empty());

        // the node's answer goes nowhere
        let reply = format!(r#"{{"jsonrpc":"2.0","id":{},"result":true}}"#, wire["id"]);
        assert!(d.handle_message(&reply).is_none());
        assert!(d.pending.is_empty());
    }

    #[tokio::test]
    async fn cancel_during_resubscribe_unsubscribes_new_id() {
        let mut d = dispatcher();
        let local = d.subscriptions.reserve();
        d.subscriptions.insert(
            local,
            "0xold".into(),
            vec![Value::from("newHeads")],
            Arc::new(|_: Vec<u8>| {}),
        );
        let frames = d.resubscribe_frames();
        let resub: Value = serde_json::from_str(&frames[0]).unwrap();

        // cancel lands before the re-subscribe response; nothing is sent
        // for the old id and the cancel succeeds
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        unsubscribe(cmd_tx, d.subscriptions.clone(), local, None)
            .await
            .unwrap();
        assert!(cmd_rx.try_recv().is_err());
        assert!(d.subscriptions.is_empty());

        let frame = d
            .handle_message(&format!(
                r#"{{"jsonrpc":"2.0","id":{},"result":"0xnew"}}"#,
                resub["id"]
            ))
            .unwrap();
        let wire: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(wire["method"], "eth_unsubscribe");
        assert_eq!(wire["params"], serde_json::json!(["0xnew"]));
    }
}
