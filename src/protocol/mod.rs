mod event;

pub use event::decode;
pub use event::join_request;
pub use event::CancelledBy;
pub use event::ConnectionClosed;
pub use event::ProtocolError;
pub use event::RideEvent;
pub use event::KNOWN_EVENTS;

#[cfg(test)]
pub use event::{RideAccepted, CONNECTION_OPEN, RIDE_ACCEPTED, RIDE_REJECTED, RIDE_STARTED};
