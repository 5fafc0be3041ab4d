use thiserror::Error;

/// Failure to decode a STOMP frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header")]
    InvalidEscape,
}

/// Failure of the physical connection to the broker.
///
/// None of these reach the user: the session logs them and falls back to
/// its reconnect schedule.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("handshake rejected: {0}")]
    Rejected(String),
    #[error("connection timed out")]
    Timeout,
    #[error("connection closed")]
    Closed,
}
