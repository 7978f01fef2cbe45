//! Server-Sent Events fan-out hub.
//!
//! This crate is the core of Pulse: it accepts long-lived unidirectional
//! streaming connections and delivers JSON-encoded events to selected
//! subsets of them.
//!
//! # Architecture
//!
//! - **Triple-index registry**: one primary map plus user and session
//!   indexes under a single lock, so routing lookups are O(1) and every
//!   snapshot is consistent.
//! - **Encode once, fan out**: each event is serialized and framed exactly
//!   once per `send`; the refcounted buffer is pushed to every match.
//! - **Failure isolation**: a connection whose bounded write queue is full
//!   or whose peer is gone is evicted without touching the rest of the
//!   fan-out. There is no per-connection retry queue; events are ephemeral.
//! - **Heartbeat and reaping**: a periodic pulse keeps intermediaries from
//!   closing idle streams, refreshes liveness timestamps and evicts
//!   connections whose peers silently vanished.
//!
//! # Message flow
//!
//! 1. The web layer establishes a stream via `Hub::create_connection` and
//!    returns the [`hub::EventStream`] as the response body; the first frame
//!    on it is the `connected` handshake.
//! 2. A producer hands the hub an [`event::Event`] plus a
//!    [`selector::Selector`] (or uses the [`notifier`] helpers over the
//!    process-wide hub).
//! 3. The hub resolves the selector against the registry, encodes the event
//!    once and writes the frame to each matching connection.
//! 4. Client-side disconnect drops the stream, whose guard deregisters the
//!    connection exactly once.
//!
//! # Modules
//!
//! - `codec`: wire framing (encode once, incremental decode)
//! - `connection`: connection record, id minting, writer seam
//! - `registry`: indexed ownership of open connections
//! - `hub`: lifecycle, routing, heartbeat loop, backpressure policy
//! - `selector`: routing predicates
//! - `event`: event model and delivery outcomes
//! - `global` / `notifier`: process-wide hub and the producer surface
//! - `error`: layered error types

pub mod codec;
pub mod connection;
pub mod error;
pub mod event;
pub mod global;
pub mod hub;
pub mod notifier;
pub mod registry;
pub mod selector;

pub use connection::{Connection, ConnectionId, ConnectionSnapshot};
pub use event::{Event, EventOptions, SendOutcome};
pub use global::{global, init_global, reset_global};
pub use hub::{EventStream, Hub, HubConfig, HubObserver, HubStats};
pub use selector::Selector;
