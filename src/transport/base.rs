use crate::protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Websocket(#[from] tungstenite::Error),
    #[error("binary frame is not valid utf-8")]
    InvalidUtf8,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A message-oriented connection carrying JSON text frames.
pub trait Transport {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;
    /// Next text frame, or `None` once the peer has closed the connection.
    fn read_message(&mut self) -> Result<Option<String>, TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
}
