//! pixhaven server - request-path orchestration
//!
//! Services that keep three stores consistent: the metadata store (source of
//! truth), the object store holding image bytes, and the shared read-through
//! cache. Every mutation purges the cache before it responds; deletes then
//! reclaim blobs inline or through a queue consumed by a background worker.
//!
//! HTTP routing is external: it parses requests into [`types`], calls
//! [`services`], and maps [`ApiError`] to a status with `status_code()`.

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod reclamation;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::{ReclamationMode, ServerConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use reclamation::{
    InMemoryQueue, QueueTransport, ReclaimOutcome, ReclaimState, ReclamationDispatcher,
    ReclamationTask, TaskKind,
};
pub use state::AppState;
pub use types::*;
