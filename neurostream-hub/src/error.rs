use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Board(#[from] neurostream_board::BoardError),

    #[error("Hub is no longer running")]
    HubClosed,
}

pub type Result<T> = std::result::Result<T, HubError>;
