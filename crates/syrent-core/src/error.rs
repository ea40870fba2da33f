//! Error handling for Syrent

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("engine error: {0}")]
    Engine(String),

    /// The action does not apply to the torrent's current state
    /// (resume of a running torrent, pause of a paused one, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("failed to load program state: {0}")]
    StateLoad(String),

    #[error("control protocol error: {0}")]
    Control(String),

    #[error("fatal engine failure: {0}")]
    Fatal(String),

    #[error("engine is stopped")]
    EngineStopped,

    #[error("torrent already added: {0}")]
    DuplicateTorrent(String),

    #[error("unknown torrent: {0}")]
    UnknownTorrent(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid torrent file: {0}")]
    InvalidTorrent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("channel error: {0}")]
    Channel(String),
}

impl Error {
    /// Whether the error is an engine-state conflict that callers swallow.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }
}

impl From<serde_bencode::Error> for Error {
    fn from(err: serde_bencode::Error) -> Self {
        Error::InvalidTorrent(err.to_string())
    }
}

impl<T> From<async_channel::SendError<T>> for Error {
    fn from(err: async_channel::SendError<T>) -> Self {
        Error::Channel(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
