//! HTTP API handlers for seedwave-gen
//!
//! REST for run management, SSE for run status and lifecycle events.

pub mod health;
pub mod runs;
pub mod sse;

pub use health::health_routes;
pub use runs::run_routes;
pub use sse::{event_stream, run_status_stream};
