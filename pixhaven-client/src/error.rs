//! Error types for the client.

use pixhaven_server::ApiError;

use crate::config::ConfigError;
use crate::query_cache::QueryKey;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The server answered with an error.
    #[error("Server rejected request: {0}")]
    Api(#[from] ApiError),
    /// The request never produced an answer.
    #[error("Transport error: {0}")]
    Transport(String),
    /// A newer fetch or an optimistic mutation replaced this one's ticket.
    #[error("Fetch superseded for {0:?}")]
    Superseded(QueryKey),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Whether the server reported that the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api(err) if err.status_code() == 404)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
