//! Stream error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("frame decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Book(#[from] mex_book::BookError),

    #[error("authentication timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("authentication rejected: {0}")]
    HandshakeRejected(String),

    #[error("authentication already in flight")]
    HandshakeInFlight,

    #[error("an ack is already pending for {key:?}")]
    AckPending { key: String },

    #[error("subscribe rejected for {channel:?}: {reason}")]
    SubscribeRejected { channel: String, reason: String },

    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}

impl StreamError {
    /// True when the local order book state can no longer be trusted and
    /// the session should reconnect for fresh snapshots.
    pub fn is_desync(&self) -> bool {
        matches!(self, Self::Book(_))
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
