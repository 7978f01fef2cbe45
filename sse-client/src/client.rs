//! Streaming consumer with typed dispatch and automatic reconnection.

use crate::subscription::{Handler, Subscription, SubscriptionRegistry, WILDCARD};
use chrono::Utc;
use futures_util::StreamExt;
use log::*;
use reqwest::header::{HeaderMap, ACCEPT};
use serde_json::Value;
use sse::codec::FrameDecoder;
use sse::event::{CONNECTED_EVENT, HEARTBEAT_EVENT};
use sse::Event;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full URL of the stream endpoint (e.g. `http://host:4000/api/sse`).
    pub url: String,
    /// Extra request headers (credentials, identity) sent with every connect.
    pub headers: HeaderMap,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HeaderMap::new(),
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Observable client state; `error` is set on abnormal transitions.
#[derive(Debug, Clone)]
pub struct ClientStatus {
    pub state: ConnectionState,
    pub error: Option<String>,
    /// Server-minted id from the `connected` handshake.
    pub connection_id: Option<String>,
    pub last_heartbeat_ms: Option<i64>,
    pub reconnect_attempts: u32,
}

struct ClientInner {
    config: ClientConfig,
    http: reqwest::Client,
    subscriptions: Arc<SubscriptionRegistry>,
    status: Mutex<ClientStatus>,
    reconnect_attempts: AtomicU32,
}

/// SSE consumer over a streaming GET.
///
/// One stream request at a time: `connect` cancels any active request before
/// issuing a new one. Events are dispatched to handlers registered under
/// their exact type, then to `"*"` handlers; `connected` and `heartbeat`
/// frames are consumed internally and never forwarded.
pub struct SseClient {
    inner: Arc<ClientInner>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SseClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                http: reqwest::Client::new(),
                subscriptions: Arc::new(SubscriptionRegistry::new()),
                status: Mutex::new(ClientStatus {
                    state: ConnectionState::Disconnected,
                    error: None,
                    connection_id: None,
                    last_heartbeat_ms: None,
                    reconnect_attempts: 0,
                }),
                reconnect_attempts: AtomicU32::new(0),
            }),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    /// Register a handler for an event type (or [`WILDCARD`]). The returned
    /// subscription removes the handler when unsubscribed.
    pub fn subscribe(
        &self,
        event_type: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        let handler: Handler = Arc::new(handler);
        let handler_id = self.inner.subscriptions.insert(event_type, handler);
        Subscription::new(
            self.inner.subscriptions.clone(),
            event_type.to_string(),
            handler_id,
        )
    }

    /// Open the stream, replacing any active request.
    pub fn connect(&self) {
        let token = {
            let mut guard = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            guard.cancel();
            *guard = CancellationToken::new();
            guard.clone()
        };

        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { run(inner, token).await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Cancel the active request and any pending reconnect timer.
    pub fn disconnect(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        self.inner
            .set_status(ConnectionState::Disconnected, None);
        // The task observes the cancelled token and exits on its own.
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn status(&self) -> ClientStatus {
        self.inner.status()
    }
}

impl Drop for SseClient {
    fn drop(&mut self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

impl ClientInner {
    fn status(&self) -> ClientStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_status(&self, state: ConnectionState, error: Option<String>) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.state = state;
        status.error = error;
        status.reconnect_attempts = self.reconnect_attempts.load(Ordering::SeqCst);
    }

    /// Route one decoded frame. Internal event types update client state;
    /// everything else goes to exact-type handlers, then wildcard handlers.
    /// A panicking handler is logged and isolated from the stream.
    fn dispatch(&self, event: &Event) {
        match event.event_type.as_str() {
            CONNECTED_EVENT => {
                let connection_id = event.data["connectionId"].as_str().map(str::to_string);
                debug!("Stream handshake complete: {connection_id:?}");
                // The handshake is the clean transition that resets the
                // reconnect counter; a bare HTTP 200 is not enough, or a
                // server that accepts and immediately closes could keep the
                // client retrying forever.
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
                status.connection_id = connection_id;
                status.reconnect_attempts = 0;
            }
            HEARTBEAT_EVENT => {
                self.status
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .last_heartbeat_ms = Some(Utc::now().timestamp_millis());
            }
            event_type => {
                let mut handlers = self.subscriptions.handlers_for(event_type);
                handlers.extend(self.subscriptions.handlers_for(WILDCARD));
                for handler in handlers {
                    if catch_unwind(AssertUnwindSafe(|| handler(&event.data))).is_err() {
                        warn!("Handler for {event_type} panicked; continuing");
                    }
                }
            }
        }
    }
}

async fn run(inner: Arc<ClientInner>, cancel: CancellationToken) {
    loop {
        inner.set_status(ConnectionState::Connecting, None);

        let error = tokio::select! {
            _ = cancel.cancelled() => {
                inner.set_status(ConnectionState::Disconnected, None);
                return;
            }
            error = stream_once(&inner) => error,
        };
        warn!("SSE stream to {} failed: {error}", inner.config.url);

        if !inner.config.auto_reconnect {
            inner.set_status(ConnectionState::Disconnected, Some(error));
            return;
        }

        let attempts = inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts > inner.config.max_reconnect_attempts {
            inner.set_status(
                ConnectionState::Disconnected,
                Some(format!(
                    "giving up after {} reconnect attempts: {error}",
                    inner.config.max_reconnect_attempts
                )),
            );
            return;
        }

        inner.set_status(ConnectionState::Disconnected, Some(error));
        debug!(
            "Reconnecting in {:?} (attempt {attempts}/{})",
            inner.config.reconnect_delay, inner.config.max_reconnect_attempts
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                inner.set_status(ConnectionState::Disconnected, None);
                return;
            }
            _ = tokio::time::sleep(inner.config.reconnect_delay) => {}
        }
    }
}

/// Drive one stream request until it fails or ends; returns the error
/// description.
async fn stream_once(inner: &ClientInner) -> String {
    let request = inner
        .http
        .get(&inner.config.url)
        .headers(inner.config.headers.clone())
        .header(ACCEPT, "text/event-stream");

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return format!("request failed: {e}"),
    };
    if !response.status().is_success() {
        return format!("unexpected HTTP status {}", response.status());
    }

    inner.set_status(ConnectionState::Connected, None);

    let mut decoder = FrameDecoder::new();
    let mut body = response.bytes_stream();
    loop {
        match body.next().await {
            Some(Ok(chunk)) => {
                for event in decoder.feed(&chunk) {
                    inner.dispatch(&event);
                }
            }
            Some(Err(e)) => return format!("stream read failed: {e}"),
            None => return "stream ended unexpectedly".to_string(),
        }
    }
}
