//! pixhaven client-side caches.
//!
//! - [`QueryCache`] holds collection views, image details and the tag list,
//!   guarded by fetch tickets so late responses never overwrite newer state.
//! - [`ClientPredictionCache`] remembers images this client just uploaded and
//!   splices them into first pages before the server lists them.
//! - [`OptimisticMutationCoordinator`] applies deletes locally before the
//!   network call and undoes them if the server refuses.
//! - [`ImagesClient`] ties these together over an [`ImageApi`] transport.

pub mod config;
pub mod error;
pub mod images;
pub mod optimistic;
pub mod prediction;
pub mod query_cache;
pub mod remote;

pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, ClientResult};
pub use images::ImagesClient;
pub use optimistic::{OptimisticMutationCoordinator, Undo};
pub use prediction::{merge_first_page, ClientPredictionCache};
pub use query_cache::{
    CachedValue, CollectionView, FetchTicket, ListMode, ListQuery, QueryCache, QueryKey,
};
pub use remote::{ImageApi, InProcessApi};
