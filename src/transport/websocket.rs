use std::net::TcpStream;

use log::{debug, info};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::base::{Transport, TransportError};

pub struct WebsocketTransport {
    conn: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl Transport for WebsocketTransport {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.conn.send(Message::Text(text.to_owned()))?;
        Ok(())
    }

    fn read_message(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.conn.read() {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Binary(data)) => {
                    return String::from_utf8(data)
                        .map(Some)
                        .map_err(|_| TransportError::InvalidUtf8);
                }
                Ok(Message::Close(frame)) => {
                    debug!("peer closed websocket: {:?}", frame);
                    return Ok(None);
                }
                // ping replies are queued by tungstenite and flushed on the next read
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.conn.close(None) {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub fn new_websocket_transport(url: &str) -> Result<WebsocketTransport, TransportError> {
    let (conn, response) = tungstenite::connect(url)?;
    info!("websocket connected: {} (status {})", url, response.status());
    Ok(WebsocketTransport { conn })
}
