// Error types shared by the store, the setup validator and the HTTP layer.

use thiserror::Error;

/// Failures surfaced to callers of the request-triggered entry points
/// (setup, start, end, refresh).
#[derive(Debug, Error)]
pub enum GameError {
    /// Setup input was rejected as a whole.
    #[error("invalid setup: {0}")]
    Validation(String),

    #[error("no game is waiting to be started")]
    NoPendingGame,

    #[error("no game is running")]
    NoRunningGame,

    /// Setup was attempted while another game is running.
    #[error("a game is already running")]
    GameInProgress,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl GameError {
    /// Whether the error is caused by the caller rather than by the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, GameError::Database(_))
    }
}

/// Failures of a single feed request. These never escape the feed client;
/// they are logged and turned into an empty batch.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    Status(reqwest::StatusCode),
}
