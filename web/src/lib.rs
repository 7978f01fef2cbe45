//! HTTP surface of the Pulse event hub.
//!
//! This crate contains only the Axum layer: routing, request validation,
//! the caller-identity extractor and error translation. The fan-out engine
//! itself lives in the `sse` crate.

pub(crate) mod controller;
pub mod error;
pub(crate) mod extractors;
pub(crate) mod params;
pub mod router;

pub use router::define_routes;
pub use service::AppState;
