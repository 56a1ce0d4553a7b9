use std::io::{self, Write};

use colored::Colorize;
use log::debug;
use regex::Regex;

use crate::protocol::{CancelledBy, RideEvent, KNOWN_EVENTS};
use crate::utils::emiter::{EventManager, SubscriptionId};

/// Which events the console prints.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub ride_id: Option<String>,
    pub names: Option<Regex>,
    /// Custom event names to print as well, matched literally.
    pub extra: Vec<String>,
}

impl EventFilter {
    pub fn selects_name(&self, name: &str) -> bool {
        self.names.as_ref().map_or(true, |re| re.is_match(name))
    }

    /// Connection events carry no ride id and always pass.
    pub fn selects_ride(&self, event: &RideEvent) -> bool {
        match (&self.ride_id, event.ride_id()) {
            (Some(wanted), Some(got)) => wanted == got,
            (Some(_), None) => matches!(event, RideEvent::ConnectionOpen | RideEvent::ConnectionClosed(_)),
            (None, _) => true,
        }
    }
}

/// Subscribes one printing handler per selected event name.
///
/// Known names are selected by the name regex; `extra` names are added as-is.
pub fn attach(events: &EventManager<RideEvent>, filter: &EventFilter) -> Vec<(String, SubscriptionId)> {
    let mut names: Vec<String> = KNOWN_EVENTS
        .iter()
        .filter(|name| filter.selects_name(name))
        .map(|name| name.to_string())
        .collect();
    for name in &filter.extra {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
        .into_iter()
        .map(|name| {
            let filter = filter.clone();
            let id = events.subscribe(&name, move |event: &RideEvent| {
                if !filter.selects_ride(event) {
                    return Ok(());
                }
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{}", format_event(event))?;
                Ok(())
            });
            (name, id)
        })
        .collect()
}

pub fn detach(events: &EventManager<RideEvent>, subscriptions: &[(String, SubscriptionId)]) {
    for (name, id) in subscriptions {
        events.unsubscribe(name, *id);
        debug!("{} listeners left on {}", events.listener_count(name), name);
    }
}

pub fn format_event(event: &RideEvent) -> String {
    let tag = format!("[{}]", event.name());
    match event {
        RideEvent::Accepted(p) => {
            let eta = p
                .estimated_arrival
                .map(|m| format!(", eta {} min", m))
                .unwrap_or_default();
            format!("{} ride {} accepted by driver {}{}", tag.green(), p.ride_id, p.driver_id, eta)
        }
        RideEvent::Rejected(p) => format!(
            "{} ride {} rejected: {}",
            tag.red(),
            p.ride_id,
            p.reason.as_deref().unwrap_or("no reason given")
        ),
        RideEvent::Started(p) => format!("{} ride {} started at {}", tag.cyan(), p.ride_id, p.start_time),
        RideEvent::Completed(p) => format!(
            "{} ride {} completed: {:.2} km, {:.0} min, fare {:.2}",
            tag.green().bold(),
            p.ride_id,
            p.total_distance,
            p.total_time,
            p.final_fare
        ),
        RideEvent::Cancelled(p) => {
            let by = match p.cancelled_by {
                Some(CancelledBy::Customer) => "customer",
                Some(CancelledBy::Driver) => "driver",
                Some(CancelledBy::System) => "system",
                Some(CancelledBy::Unknown) | None => "unknown",
            };
            format!(
                "{} ride {} cancelled by {}: {}",
                tag.red().bold(),
                p.ride_id,
                by,
                p.reason.as_deref().unwrap_or("no reason given")
            )
        }
        RideEvent::DriverLocation(p) => {
            let speed = p.speed.map(|s| format!(" at {:.1} m/s", s)).unwrap_or_default();
            format!(
                "{} ride {} driver at ({:.5}, {:.5}) ±{:.0}m{}",
                tag.blue(),
                p.ride_id,
                p.latitude,
                p.longitude,
                p.accuracy,
                speed
            )
        }
        RideEvent::ConnectionOpen => format!("{} connected", tag.yellow()),
        RideEvent::ConnectionClosed(p) => match &p.reason {
            Some(reason) => format!("{} connection lost: {}", tag.yellow(), reason),
            None => format!("{} connection closed", tag.yellow()),
        },
        RideEvent::Custom { payload, .. } => format!("{} {}", tag.dimmed(), payload),
    }
}
