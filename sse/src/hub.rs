//! Connection lifecycle, routing and the heartbeat loop.

use crate::codec;
use crate::connection::{Connection, ConnectionId, ConnectionWriter};
use crate::error::{hub_error, Error, HubErrorKind};
use crate::event::{Event, SendOutcome};
use crate::registry::{ConnectionRegistry, RegistryStats};
use crate::selector::Selector;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use log::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Tunables for a hub instance. Defaults match a deployment behind a
/// reverse proxy with a 75s idle timeout.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Milliseconds between heartbeat ticks.
    pub heartbeat_interval_ms: u64,
    /// A connection whose `last_seen` is older than this is reaped.
    pub connection_timeout_ms: u64,
    /// Admission cap on concurrently open streams.
    pub max_connections: usize,
    /// When false, no periodic ticks run and no staleness reaping happens.
    pub enable_heartbeat: bool,
    /// Frames a single connection may have queued before a write is treated
    /// as failed and the connection is evicted.
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            connection_timeout_ms: 60_000,
            max_connections: 1_000,
            enable_heartbeat: true,
            channel_capacity: 64,
        }
    }
}

/// Lifecycle observer seam. Synchronous because `on_disconnect` can fire
/// from the stream guard's `Drop`.
pub trait HubObserver: Send + Sync {
    fn on_connect(&self, _connection: &Connection) {}
    fn on_disconnect(&self, _connection: &Connection) {}
}

/// One consistent statistics snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    #[serde(flatten)]
    pub registry: RegistryStats,
    pub uptime_seconds: i64,
    pub total_events_sent: u64,
    pub heartbeats_sent: u64,
}

/// The event fan-out hub.
///
/// Owns the registry, encodes each event exactly once per `send` and pushes
/// the shared buffer down every matching stream. A failing connection is
/// evicted without affecting the rest of the fan-out.
pub struct Hub {
    registry: ConnectionRegistry,
    config: HubConfig,
    observers: Vec<Arc<dyn HubObserver>>,
    started_at: DateTime<Utc>,
    events_sent: AtomicU64,
    heartbeats_sent: AtomicU64,
    shutting_down: AtomicBool,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Arc<Self> {
        Self::with_observers(config, Vec::new())
    }

    pub fn with_observers(config: HubConfig, observers: Vec<Arc<dyn HubObserver>>) -> Arc<Self> {
        Arc::new(Self {
            registry: ConnectionRegistry::new(),
            config,
            observers,
            started_at: Utc::now(),
            events_sent: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            heartbeat_task: Mutex::new(None),
        })
    }

    /// Build a hub and spawn its heartbeat loop. Requires a tokio runtime.
    pub fn start(config: HubConfig) -> Arc<Self> {
        let hub = Self::new(config);
        hub.start_heartbeat();
        hub
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a new connection and return it together with the stream the
    /// HTTP layer hands back to the client. The first bytes on the stream
    /// are the `connected` handshake frame.
    pub fn create_connection(
        self: &Arc<Self>,
        user_id: Option<String>,
        session_id: Option<String>,
        metadata: HashMap<String, Value>,
    ) -> Result<(Arc<Connection>, EventStream), Error> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(hub_error(
                HubErrorKind::ShuttingDown,
                "hub is shutting down",
            ));
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let writer = ConnectionWriter::new(tx);

        let connection = self
            .registry
            .insert_new(self.config.max_connections, move |id| {
                Arc::new(Connection::new(id, user_id, session_id, metadata, writer))
            })
            .ok_or_else(|| {
                hub_error(
                    HubErrorKind::CapacityExceeded,
                    &format!("connection limit of {} reached", self.config.max_connections),
                )
            })?;

        let handshake = Event::connected(connection.id.as_str(), &Utc::now().to_rfc3339());
        let frame = codec::encode(&handshake)?;
        if connection.writer.write(frame).is_err() {
            // Peer vanished between accept and handshake.
            self.remove_connection(&connection.id);
            return Err(hub_error(HubErrorKind::WriteFailed, "handshake write failed"));
        }

        for observer in &self.observers {
            observer.on_connect(&connection);
        }
        debug!(
            "Registered SSE connection {} (user={:?}, session={:?})",
            connection.id, connection.user_id, connection.session_id
        );

        let stream = EventStream {
            rx,
            _guard: DisconnectGuard {
                hub: Arc::downgrade(self),
                id: connection.id.clone(),
            },
        };
        Ok((connection, stream))
    }

    /// Idempotent removal: closes the writer (a close race with a peer that
    /// already vanished is swallowed), deregisters, and fires
    /// `on_disconnect` only when this call actually removed the connection.
    pub fn remove_connection(&self, id: &ConnectionId) -> bool {
        match self.registry.remove(id) {
            Some(connection) => {
                if !connection.writer.close() {
                    debug!("Writer for {id} was already closed");
                }
                for observer in &self.observers {
                    observer.on_disconnect(&connection);
                }
                debug!("Unregistered SSE connection {id}");
                true
            }
            None => false,
        }
    }

    /// Resolve the selector, encode the event once, and push the shared
    /// buffer to every match. A connection whose write fails is counted in
    /// `failed` and evicted after the loop; the rest of the fan-out is
    /// unaffected.
    pub fn send(&self, event: &Event, selector: &Selector) -> SendOutcome {
        let targets = self.registry.list(selector);
        if targets.is_empty() {
            return SendOutcome::default();
        }

        let frame = match codec::encode(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {} event: {e}", event.event_type);
                return SendOutcome {
                    sent: 0,
                    failed: targets.len(),
                };
            }
        };

        let mut outcome = SendOutcome::default();
        let mut failed_ids: Vec<ConnectionId> = Vec::new();
        for connection in &targets {
            match connection.writer.write(frame.clone()) {
                Ok(()) => outcome.sent += 1,
                Err(write_error) => {
                    outcome.failed += 1;
                    failed_ids.push(connection.id.clone());
                    warn!(
                        "Write to connection {} failed ({write_error:?}); evicting",
                        connection.id
                    );
                }
            }
        }
        for id in &failed_ids {
            self.remove_connection(id);
        }

        self.events_sent
            .fetch_add(outcome.sent as u64, Ordering::Relaxed);
        outcome
    }

    pub fn broadcast(&self, event: &Event) -> SendOutcome {
        self.send(event, &Selector::all())
    }

    pub fn send_to_user(&self, user_id: &str, event: &Event) -> SendOutcome {
        self.send(event, &Selector::user(user_id))
    }

    pub fn send_to_session(&self, session_id: &str, event: &Event) -> SendOutcome {
        self.send(event, &Selector::session(session_id))
    }

    pub fn send_to_connection(&self, connection_id: &str, event: &Event) -> SendOutcome {
        self.send(event, &Selector::connection(connection_id))
    }

    pub fn get_connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.registry.get(id)
    }

    pub fn list_connections(&self, selector: &Selector) -> Vec<Arc<Connection>> {
        self.registry.list(selector)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            registry: self.registry.snapshot_stats(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            total_events_sent: self.events_sent.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
        }
    }

    /// One heartbeat cycle: broadcast the pulse, refresh `last_seen` on
    /// every connection that is still registered, then reap the stale ones.
    /// The ordering means a just-added connection survives its first tick
    /// and a connection that failed the broadcast write is gone before
    /// `touch` runs.
    pub fn heartbeat_tick(&self) {
        let now = Utc::now();
        let outcome = self.broadcast(&Event::heartbeat(&now.to_rfc3339()));
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
        if outcome.failed > 0 {
            debug!(
                "Heartbeat delivered to {} connection(s), evicted {}",
                outcome.sent, outcome.failed
            );
        }

        let now_ms = now.timestamp_millis();
        for connection in self.registry.list(&Selector::all()) {
            self.registry.touch(&connection.id, now_ms);
        }

        let stale = self
            .registry
            .list_stale(self.config.connection_timeout_ms as i64, now_ms);
        if !stale.is_empty() {
            info!("Reaping {} stale connection(s)", stale.len());
            for connection in &stale {
                self.remove_connection(&connection.id);
            }
        }
    }

    /// Spawn the periodic heartbeat loop. No-op when heartbeats are
    /// disabled; the loop holds only a weak reference so a dropped hub
    /// stops ticking on its own.
    pub fn start_heartbeat(self: &Arc<Self>) {
        if !self.config.enable_heartbeat {
            return;
        }

        let hub: Weak<Hub> = Arc::downgrade(self);
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the initial
            // pulse arrives one full interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match hub.upgrade() {
                    Some(hub) => hub.heartbeat_tick(),
                    None => break,
                }
            }
        });

        *self
            .heartbeat_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Cancel the heartbeat loop, close and remove every connection.
    /// Idempotent; no connection is admitted afterwards.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self
            .heartbeat_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        let removed = self.registry.clear();
        for connection in &removed {
            connection.writer.close();
            for observer in &self.observers {
                observer.on_disconnect(connection);
            }
        }
        info!("Hub shut down; closed {} connection(s)", removed.len());
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        if let Some(handle) = self
            .heartbeat_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// The streaming body handed to the HTTP layer: pre-encoded frames from the
/// connection's queue, plus a guard that deregisters the connection when the
/// body is dropped (the peer-cancellation signal).
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<Bytes>,
    _guard: DisconnectGuard,
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

#[derive(Debug)]
struct DisconnectGuard {
    hub: Weak<Hub>,
    id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove_connection(&self.id);
        }
    }
}
