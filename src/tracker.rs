use std::rc::Rc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use retry::delay::Fibonacci;

use crate::option::TrackerOption;
use crate::protocol::{self, ConnectionClosed, RideEvent};
use crate::transport::{self, Transport, TransportError};
use crate::utils::emiter::EventManager;

const MAX_BACKOFF_STEPS: usize = 16;
const MAX_SESSION_DELAY: Duration = Duration::from_secs(30);

pub struct RideTracker {
    opts: TrackerOption,
    events: Rc<EventManager<RideEvent>>,
}

impl RideTracker {
    pub fn new(opts: TrackerOption, events: Rc<EventManager<RideEvent>>) -> Self {
        RideTracker { opts, events }
    }

    /// Connects and pumps events until the server goes away for good.
    pub fn bootstrap(&self) -> Result<(), TransportError> {
        let opts = &self.opts;
        self.bootstrap_with(|| transport::connect_with_retry(&opts.url, &opts.reconnect), thread::sleep)
    }

    /// Session loop over an arbitrary connector.
    ///
    /// Between sessions the tracker waits on a fibonacci schedule that grows
    /// while sessions deliver no events and resets once one does.
    pub fn bootstrap_with<C, T, S>(&self, mut connect: C, mut sleep: S) -> Result<(), TransportError>
    where
        C: FnMut() -> Result<T, TransportError>,
        T: Transport,
        S: FnMut(Duration),
    {
        let mut session = 0u64;
        let mut idle_sessions = 0usize;
        loop {
            let mut tsport = connect()?;
            session += 1;
            info!("session {} open on {}", session, self.opts.url);

            let outcome = self.run_session(&mut tsport);
            if let Err(err) = tsport.close() {
                debug!("close websocket: {}", err);
            }

            let reason = match &outcome {
                Ok(count) => {
                    info!("session {} closed by server after {} events", session, count);
                    None
                }
                Err(err) => {
                    warn!("session {} lost: {}", session, err);
                    Some(err.to_string())
                }
            };
            emit(&self.events, RideEvent::ConnectionClosed(ConnectionClosed { reason }));

            if !self.opts.reconnect.enabled {
                return outcome.map(|_| ());
            }
            match outcome {
                Ok(count) if count > 0 => idle_sessions = 0,
                _ => idle_sessions += 1,
            }
            let delay = self.session_delay(idle_sessions);
            debug!("reconnect in {:?}", delay);
            sleep(delay);
        }
    }

    fn session_delay(&self, idle_sessions: usize) -> Duration {
        Fibonacci::from_millis(self.opts.reconnect.initial_delay_ms)
            .nth(idle_sessions.min(MAX_BACKOFF_STEPS))
            .unwrap_or(MAX_SESSION_DELAY)
            .min(MAX_SESSION_DELAY)
    }

    fn run_session<T: Transport + ?Sized>(&self, tsport: &mut T) -> Result<usize, TransportError> {
        emit(&self.events, RideEvent::ConnectionOpen);
        if let Some(ride_id) = &self.opts.ride_id {
            tsport.send_text(&protocol::join_request(ride_id)?)?;
            debug!("joined ride {}", ride_id);
        }
        pump(tsport, &self.events)
    }
}

/// Moves frames from `tsport` into `events` until the peer closes.
///
/// Frames that fail to decode are logged and skipped. Returns the number of
/// events emitted.
pub fn pump<T: Transport + ?Sized>(tsport: &mut T, events: &EventManager<RideEvent>) -> Result<usize, TransportError> {
    let mut count = 0;
    while let Some(text) = tsport.read_message()? {
        match protocol::decode(&text) {
            Ok(event) => {
                emit(events, event);
                count += 1;
            }
            Err(err) => warn!("drop message: {}", err),
        }
    }
    Ok(count)
}

fn emit(events: &EventManager<RideEvent>, event: RideEvent) {
    let name = event.name().to_string();
    events.emit(&name, event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct MockTransport {
        inbox: VecDeque<Result<String, TransportError>>,
        sent: Vec<String>,
    }

    impl MockTransport {
        fn new(frames: &[&str]) -> Self {
            MockTransport {
                inbox: frames.iter().map(|f| Ok(f.to_string())).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for MockTransport {
        fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
            self.sent.push(text.to_string());
            Ok(())
        }

        fn read_message(&mut self) -> Result<Option<String>, TransportError> {
            self.inbox.pop_front().transpose()
        }

        fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn record_names(events: &EventManager<RideEvent>, names: &[&str]) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        for name in names {
            let seen = seen.clone();
            events.subscribe(name, move |event: &RideEvent| {
                seen.borrow_mut().push(event.name().to_string());
                Ok(())
            });
        }
        seen
    }

    #[test]
    fn pump_emits_in_arrival_order() {
        let events = EventManager::new();
        let seen = record_names(&events, &[protocol::RIDE_ACCEPTED, protocol::RIDE_STARTED]);
        let mut tsport = MockTransport::new(&[
            r#"{"event":"ride:accepted","payload":{"rideId":"r1","driverId":"d1"}}"#,
            r#"{"event":"ride:started","payload":{"rideId":"r1","startTime":"2024-01-01T10:00:00Z"}}"#,
        ]);

        let count = pump(&mut tsport, &events).unwrap();

        assert_eq!(count, 2);
        assert_eq!(*seen.borrow(), vec!["ride:accepted", "ride:started"]);
        assert_eq!(events.event_history().len(), 2);
    }

    #[test]
    fn pump_skips_undecodable_frames() {
        let events = EventManager::new();
        let mut tsport = MockTransport::new(&[
            "not json",
            r#"{"event":"ride:completed","payload":{"rideId":"r1"}}"#,
            r#"{"event":"ride:rejected","payload":{"rideId":"r1","reason":"busy"}}"#,
        ]);

        let count = pump(&mut tsport, &events).unwrap();

        assert_eq!(count, 1);
        let history = events.event_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_name, "ride:rejected");
    }

    #[test]
    fn pump_propagates_transport_errors() {
        let events = EventManager::new();
        let mut tsport = MockTransport::new(&[r#"{"event":"custom:ping"}"#]);
        tsport.inbox.push_back(Err(TransportError::InvalidUtf8));

        let result = pump(&mut tsport, &events);

        assert!(matches!(result, Err(TransportError::InvalidUtf8)));
        assert_eq!(events.event_history().len(), 1);
    }

    #[test]
    fn session_joins_configured_ride() {
        let events = Rc::new(EventManager::new());
        let seen = record_names(&events, &[protocol::CONNECTION_OPEN]);
        let mut opts = TrackerOption::new("ws://localhost:9000/ws");
        opts.ride_id = Some("r7".to_string());
        let tracker = RideTracker::new(opts, events.clone());
        let mut tsport = MockTransport::new(&[]);

        let count = tracker.run_session(&mut tsport).unwrap();

        assert_eq!(count, 0);
        assert_eq!(*seen.borrow(), vec!["connection:open"]);
        assert_eq!(tsport.sent, vec![r#"{"event":"ride:subscribe","payload":{"rideId":"r7"}}"#]);
    }

    fn history_names(events: &EventManager<RideEvent>) -> Vec<String> {
        events.event_history().into_iter().map(|e| e.event_name).collect()
    }

    fn refused() -> TransportError {
        TransportError::Websocket(tungstenite::Error::ConnectionClosed)
    }

    #[test]
    fn reconnect_backs_off_while_sessions_stay_idle() {
        let events = Rc::new(EventManager::new());
        let mut opts = TrackerOption::new("ws://localhost:9000/ws");
        opts.reconnect.initial_delay_ms = 10;
        let tracker = RideTracker::new(opts, events.clone());
        let mut sessions: VecDeque<MockTransport> = VecDeque::from(vec![
            MockTransport::new(&[r#"{"event":"ride:accepted","payload":{"rideId":"r1","driverId":"d1"}}"#]),
            MockTransport::new(&[]),
            MockTransport::new(&[]),
        ]);
        let mut sleeps = Vec::new();

        let result = tracker.bootstrap_with(|| sessions.pop_front().ok_or_else(refused), |d| sleeps.push(d));

        assert!(matches!(result, Err(TransportError::Websocket(_))));
        assert_eq!(
            sleeps,
            vec![Duration::from_millis(10), Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(
            history_names(&events),
            vec![
                "connection:open",
                "ride:accepted",
                "connection:closed",
                "connection:open",
                "connection:closed",
                "connection:open",
                "connection:closed",
            ]
        );
    }

    #[test]
    fn busy_session_resets_backoff() {
        let events = Rc::new(EventManager::new());
        let mut opts = TrackerOption::new("ws://localhost:9000/ws");
        opts.reconnect.initial_delay_ms = 10;
        let tracker = RideTracker::new(opts, events);
        let started = r#"{"event":"ride:started","payload":{"rideId":"r1","startTime":"08:30"}}"#;
        let mut sessions: VecDeque<MockTransport> = VecDeque::from(vec![
            MockTransport::new(&[]),
            MockTransport::new(&[]),
            MockTransport::new(&[started]),
        ]);
        let mut sleeps = Vec::new();

        let _ = tracker.bootstrap_with(|| sessions.pop_front().ok_or_else(refused), |d| sleeps.push(d));

        assert_eq!(
            sleeps,
            vec![Duration::from_millis(10), Duration::from_millis(20), Duration::from_millis(10)]
        );
    }

    #[test]
    fn session_delay_is_capped() {
        let events = Rc::new(EventManager::new());
        let mut opts = TrackerOption::new("ws://localhost:9000/ws");
        opts.reconnect.initial_delay_ms = 5_000;
        let tracker = RideTracker::new(opts, events);

        assert_eq!(tracker.session_delay(0), Duration::from_secs(5));
        assert_eq!(tracker.session_delay(1_000), MAX_SESSION_DELAY);
    }

    #[test]
    fn no_reconnect_stops_after_first_session() {
        let events = Rc::new(EventManager::new());
        let mut opts = TrackerOption::new("ws://localhost:9000/ws");
        opts.reconnect.enabled = false;
        let tracker = RideTracker::new(opts, events.clone());
        let mut connects = 0;
        let mut sleeps: Vec<Duration> = Vec::new();

        let result = tracker.bootstrap_with(
            || {
                connects += 1;
                Ok(MockTransport::new(&[r#"{"event":"ride:rejected","payload":{"rideId":"r1"}}"#]))
            },
            |d| sleeps.push(d),
        );

        assert!(result.is_ok());
        assert_eq!(connects, 1);
        assert!(sleeps.is_empty());
        assert_eq!(
            history_names(&events),
            vec!["connection:open", "ride:rejected", "connection:closed"]
        );
    }
}
