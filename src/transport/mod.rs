mod base;
mod websocket;

use log::warn;
use retry::delay::Fibonacci;
use retry::retry;

pub use base::{Transport, TransportError};
pub use websocket::WebsocketTransport;
use websocket::new_websocket_transport;

use crate::option::ReconnectOpts;

/// Opens a websocket, retrying with fibonacci back-off per `opts`.
pub fn connect_with_retry(url: &str, opts: &ReconnectOpts) -> Result<WebsocketTransport, TransportError> {
    let delays = Fibonacci::from_millis(opts.initial_delay_ms).take(opts.max_attempts);
    let mut attempt = 0usize;
    retry(delays, || {
        attempt += 1;
        new_websocket_transport(url).map_err(|err| {
            warn!("connect {} attempt {} failed: {}", url, attempt, err);
            err
        })
    })
    .map_err(|err| err.error)
}
