// event.rs
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const RIDE_ACCEPTED: &str = "ride:accepted";
pub const RIDE_REJECTED: &str = "ride:rejected";
pub const RIDE_STARTED: &str = "ride:started";
pub const RIDE_COMPLETED: &str = "ride:completed";
pub const RIDE_CANCELLED: &str = "ride:cancelled";
pub const DRIVER_LOCATION_UPDATE: &str = "driverLocationUpdate";
pub const CONNECTION_OPEN: &str = "connection:open";
pub const CONNECTION_CLOSED: &str = "connection:closed";
pub const RIDE_SUBSCRIBE: &str = "ride:subscribe";

/// Every name that decodes to a typed variant.
pub const KNOWN_EVENTS: [&str; 8] = [
    RIDE_ACCEPTED,
    RIDE_REJECTED,
    RIDE_STARTED,
    RIDE_COMPLETED,
    RIDE_CANCELLED,
    DRIVER_LOCATION_UPDATE,
    CONNECTION_OPEN,
    CONNECTION_CLOSED,
];

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid payload for {event}: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One websocket text frame: `{"event": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideAccepted {
    pub ride_id: String,
    pub driver_id: String,
    /// minutes until pickup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_arrival: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRejected {
    pub ride_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideStarted {
    pub ride_id: String,
    pub start_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCompleted {
    pub ride_id: String,
    pub total_distance: f64,
    pub total_time: f64,
    pub final_fare: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Customer,
    Driver,
    System,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCancelled {
    pub ride_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<CancelledBy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    pub ride_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionClosed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RideEvent {
    Accepted(RideAccepted),
    Rejected(RideRejected),
    Started(RideStarted),
    Completed(RideCompleted),
    Cancelled(RideCancelled),
    DriverLocation(DriverLocation),
    ConnectionOpen,
    ConnectionClosed(ConnectionClosed),
    Custom { name: String, payload: Value },
}

impl RideEvent {
    pub fn name(&self) -> &str {
        match self {
            RideEvent::Accepted(_) => RIDE_ACCEPTED,
            RideEvent::Rejected(_) => RIDE_REJECTED,
            RideEvent::Started(_) => RIDE_STARTED,
            RideEvent::Completed(_) => RIDE_COMPLETED,
            RideEvent::Cancelled(_) => RIDE_CANCELLED,
            RideEvent::DriverLocation(_) => DRIVER_LOCATION_UPDATE,
            RideEvent::ConnectionOpen => CONNECTION_OPEN,
            RideEvent::ConnectionClosed(_) => CONNECTION_CLOSED,
            RideEvent::Custom { name, .. } => name.as_str(),
        }
    }

    /// Correlation id used by subscribers to drop events for other rides.
    pub fn ride_id(&self) -> Option<&str> {
        match self {
            RideEvent::Accepted(p) => Some(p.ride_id.as_str()),
            RideEvent::Rejected(p) => Some(p.ride_id.as_str()),
            RideEvent::Started(p) => Some(p.ride_id.as_str()),
            RideEvent::Completed(p) => Some(p.ride_id.as_str()),
            RideEvent::Cancelled(p) => Some(p.ride_id.as_str()),
            RideEvent::DriverLocation(p) => Some(p.ride_id.as_str()),
            RideEvent::ConnectionOpen | RideEvent::ConnectionClosed(_) => None,
            RideEvent::Custom { payload, .. } => payload.get("rideId").and_then(Value::as_str),
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Result<RideEvent, ProtocolError> {
        let Envelope { event, payload } = envelope;
        let decoded = match event.as_str() {
            RIDE_ACCEPTED => RideEvent::Accepted(payload_of(&event, payload)?),
            RIDE_REJECTED => RideEvent::Rejected(payload_of(&event, payload)?),
            RIDE_STARTED => RideEvent::Started(payload_of(&event, payload)?),
            RIDE_COMPLETED => RideEvent::Completed(payload_of(&event, payload)?),
            RIDE_CANCELLED => RideEvent::Cancelled(payload_of(&event, payload)?),
            DRIVER_LOCATION_UPDATE => RideEvent::DriverLocation(payload_of(&event, payload)?),
            CONNECTION_OPEN => RideEvent::ConnectionOpen,
            CONNECTION_CLOSED => {
                if payload.is_null() {
                    RideEvent::ConnectionClosed(ConnectionClosed::default())
                } else {
                    RideEvent::ConnectionClosed(payload_of(&event, payload)?)
                }
            }
            _ => RideEvent::Custom { name: event, payload },
        };
        Ok(decoded)
    }

    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let payload = match self {
            RideEvent::Accepted(p) => serde_json::to_value(p)?,
            RideEvent::Rejected(p) => serde_json::to_value(p)?,
            RideEvent::Started(p) => serde_json::to_value(p)?,
            RideEvent::Completed(p) => serde_json::to_value(p)?,
            RideEvent::Cancelled(p) => serde_json::to_value(p)?,
            RideEvent::DriverLocation(p) => serde_json::to_value(p)?,
            RideEvent::ConnectionOpen => Value::Null,
            RideEvent::ConnectionClosed(p) => serde_json::to_value(p)?,
            RideEvent::Custom { payload, .. } => payload.clone(),
        };
        Ok(Envelope {
            event: self.name().to_string(),
            payload,
        })
    }
}

impl Serialize for RideEvent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_envelope()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

fn payload_of<P: DeserializeOwned>(event: &str, payload: Value) -> Result<P, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::Payload {
        event: event.to_string(),
        source,
    })
}

// decode parses one text frame into a ride event
pub fn decode(text: &str) -> Result<RideEvent, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    RideEvent::from_envelope(envelope)
}

/// Frame asking the server to push events for `ride_id` on this connection.
pub fn join_request(ride_id: &str) -> Result<String, ProtocolError> {
    let envelope = Envelope {
        event: RIDE_SUBSCRIBE.to_string(),
        payload: json!({ "rideId": ride_id }),
    };
    Ok(serde_json::to_string(&envelope)?)
}
