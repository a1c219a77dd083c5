//! Background Jobs
//!
//! - `reclamation_worker`: consumes queued blob reclamation tasks
//! - `expiry_sweep`: deletes images past their expiry
//!
//! Both stop when the shared `watch` shutdown channel flips to true and
//! return their metrics.

pub mod expiry_sweep;
pub mod reclamation_worker;

pub use expiry_sweep::{expiry_sweep_task, ExpirySweepConfig, ExpirySweepMetrics};
pub use reclamation_worker::{
    drain, process_batch, reclamation_worker_task, ReclamationWorkerConfig,
    ReclamationWorkerMetrics, ReclamationWorkerSnapshot,
};
