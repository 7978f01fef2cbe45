//! Consumer side of the Pulse event stream.
//!
//! Connects to the hub's stream endpoint with a plain streaming GET, parses
//! the wire framing incrementally (via `sse::codec`), and dispatches decoded
//! events to typed handlers. The `connected` handshake and `heartbeat`
//! pulses are consumed internally; everything else reaches subscribers.
//!
//! Reconnection is on by default: a stream error or unexpected end schedules
//! a retry after `reconnect_delay`, a successful connection resets the
//! attempt counter, and exhausting `max_reconnect_attempts` settles the
//! client in `Disconnected` with a terminal error.

pub mod client;
pub mod subscription;

pub use client::{ClientConfig, ClientStatus, ConnectionState, SseClient};
pub use subscription::{Subscription, WILDCARD};
