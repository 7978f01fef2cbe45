//! A single open stream to one client, and the writer seam the hub pushes
//! pre-encoded frames through.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Server-minted opaque connection identifier: `sse_<millis>_<9-char suffix>`.
///
/// Unique within the process; the registry re-rolls on the improbable
/// collision since the id doubles as the primary map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(9)
            .map(char::from)
            .collect();
        Self(format!("sse_{}_{}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a frame could not be handed to a connection's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// The bounded queue is full; the peer is not draining.
    Full,
    /// The peer side of the stream is gone or the writer was closed.
    Closed,
}

/// Output sink for one connection.
///
/// Wraps the bounded channel feeding the HTTP response body. `write` never
/// blocks: a full queue is reported as [`WriteError::Full`] and the hub
/// resolves backpressure by evicting the connection. `close` is idempotent
/// and ends the response body once every queued frame has drained.
#[derive(Debug)]
pub struct ConnectionWriter {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl ConnectionWriter {
    pub(crate) fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    pub fn write(&self, frame: Bytes) -> Result<(), WriteError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.try_send(frame).map_err(|e| match e {
                TrySendError::Full(_) => WriteError::Full,
                TrySendError::Closed(_) => WriteError::Closed,
            }),
            None => Err(WriteError::Closed),
        }
    }

    /// Returns true when this call actually closed the writer.
    pub fn close(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// One open stream: identity, routing keys, immutable metadata and the
/// liveness timestamp the heartbeat loop refreshes.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub(crate) writer: ConnectionWriter,
    pub connected_at: DateTime<Utc>,
    last_seen: AtomicI64,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        user_id: Option<String>,
        session_id: Option<String>,
        metadata: HashMap<String, Value>,
        writer: ConnectionWriter,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            session_id,
            metadata,
            writer,
            connected_at: now,
            last_seen: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Refresh `last_seen`; called only from the heartbeat loop.
    pub(crate) fn touch(&self, now_ms: i64) {
        self.last_seen.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_seen_ms(&self) -> i64 {
        self.last_seen.load(Ordering::Relaxed)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Serializable view for the stats endpoint.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            metadata: self.metadata.clone(),
            connected_at: self.connected_at.to_rfc3339(),
            last_seen_ms: self.last_seen_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub connected_at: String,
    pub last_seen_ms: i64,
}
