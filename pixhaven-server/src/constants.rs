//! Constants for the pixhaven server
//!
//! Defaults for every tunable live here; `config.rs` reads overrides from the
//! environment.

// ============================================================================
// CACHE
// ============================================================================

/// Default key namespace shared by every server instance.
pub const DEFAULT_CACHE_NAMESPACE: &str = "pixhaven";

/// TTL for a single image's detail payload (5 minutes)
pub const DEFAULT_IMAGE_DETAIL_TTL_SECS: u64 = 300;

/// TTL for image list pages (1 minute)
pub const DEFAULT_IMAGE_LIST_TTL_SECS: u64 = 60;

/// TTL for the tag list (5 minutes)
pub const DEFAULT_TAG_LIST_TTL_SECS: u64 = 300;

// ============================================================================
// PAGINATION
// ============================================================================

/// Default page size for image lists
pub const DEFAULT_PAGE_LIMIT: u32 = 12;

// ============================================================================
// UPLOADS
// ============================================================================

/// Largest accepted source file (70 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 70 * 1024 * 1024;

/// Largest accepted expiry, in minutes (one year)
pub const MAX_EXPIRY_MINUTES: u64 = 525_600;

// ============================================================================
// BATCH OPERATIONS
// ============================================================================

/// Maximum number of images in one batch tag request
pub const MAX_BATCH_ITEMS: usize = 500;

// ============================================================================
// RECLAMATION
// ============================================================================

/// Images per queued reclamation message for cascade deletes
pub const DEFAULT_RECLAIM_CHUNK_SIZE: usize = 50;

/// Deliveries before a reclamation message is parked as dead
pub const DEFAULT_RECLAIM_MAX_ATTEMPTS: u32 = 5;

/// Seconds a received message stays invisible before redelivery
pub const DEFAULT_RECLAIM_VISIBILITY_TIMEOUT_SECS: u64 = 30;

/// Messages handled per worker poll
pub const DEFAULT_RECLAIM_BATCH_SIZE: usize = 10;

/// Worker poll interval in milliseconds
pub const DEFAULT_RECLAIM_POLL_INTERVAL_MS: u64 = 500;

/// Base redelivery delay in milliseconds, doubled per attempt
pub const DEFAULT_RECLAIM_RETRY_BACKOFF_MS: u64 = 1_000;

/// Cap on the redelivery delay in milliseconds
pub const MAX_RECLAIM_RETRY_BACKOFF_MS: u64 = 60_000;

// ============================================================================
// EXPIRY SWEEP
// ============================================================================

/// How often the expiry sweep runs (hourly)
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Expired images handled per sweep cycle
pub const DEFAULT_EXPIRY_SWEEP_BATCH_SIZE: usize = 100;
