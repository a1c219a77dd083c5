//! Telemetry for the pixhaven server
//!
//! Structured logging through `tracing`. Components record decisions (cache
//! fail-open, purge, reclaim, redelivery) as fields on events.

pub mod tracer;

pub use tracer::{init_tracing, TelemetryConfig};
