//! In-process publish/subscribe keyed by event name.
//!
//! Handlers run synchronously in registration order. Each emission iterates a
//! snapshot of the handler list, so handlers may subscribe, unsubscribe or
//! emit on the same manager; such changes apply from the next emission.
//! Every emitted event is also kept in a bounded history, oldest first.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error};
use serde::Serialize;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

pub type HandlerResult = Result<(), Box<dyn Error>>;

type EventCallback<T> = Rc<dyn Fn(&T) -> HandlerResult>;

/// Token returned by [`EventManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerFailure {
    #[error("handler returned error: {0}")]
    Error(String),
    #[error("handler panicked: {0}")]
    Panic(String),
}

/// Receives failures caught while emitting.
pub trait FailureSink {
    fn handler_failed(&self, event_name: &str, id: SubscriptionId, failure: &HandlerFailure);
}

/// Default sink, writes through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FailureSink for LogSink {
    fn handler_failed(&self, event_name: &str, id: SubscriptionId, failure: &HandlerFailure) {
        error!("event {} handler {} failed: {}", event_name, id, failure);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry<T> {
    pub event_name: String,
    pub payload: T,
    /// milliseconds since the unix epoch
    pub timestamp: u64,
}

pub struct EventManager<T> {
    subscribers: RefCell<HashMap<String, Vec<(SubscriptionId, EventCallback<T>)>>>,
    history: RefCell<VecDeque<HistoryEntry<T>>>,
    history_limit: usize,
    next_id: Cell<u64>,
    sink: Box<dyn FailureSink>,
}

impl<T> EventManager<T> {
    pub fn new() -> EventManager<T> {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> EventManager<T> {
        Self::with_sink(history_limit, Box::new(LogSink))
    }

    pub fn with_sink(history_limit: usize, sink: Box<dyn FailureSink>) -> EventManager<T> {
        EventManager {
            subscribers: RefCell::new(HashMap::new()),
            history: RefCell::new(VecDeque::with_capacity(history_limit.min(DEFAULT_HISTORY_LIMIT))),
            history_limit,
            next_id: Cell::new(1),
            sink,
        }
    }

    /// Registers `callback` behind every handler already subscribed to `event_name`.
    pub fn subscribe<F>(&self, event_name: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&T) -> HandlerResult + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers
            .entry(event_name.to_string())
            .or_default()
            .push((id, Rc::new(callback)));
        debug!("subscribe {} to {}", id, event_name);
        id
    }

    /// Removes one registration. Unknown names or ids are ignored.
    pub fn unsubscribe(&self, event_name: &str, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let Some(callbacks) = subscribers.get_mut(event_name) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(sid, _)| *sid != id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            subscribers.remove(event_name);
        }
        if removed {
            debug!("unsubscribe {} from {}", id, event_name);
        }
        removed
    }

    /// Snapshot of how many handlers each event name currently has.
    pub fn listener_counts(&self) -> BTreeMap<String, usize> {
        self.subscribers
            .borrow()
            .iter()
            .map(|(name, callbacks)| (name.clone(), callbacks.len()))
            .collect()
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.subscribers.borrow().get(event_name).map_or(0, Vec::len)
    }

    pub fn total_listeners(&self) -> usize {
        self.subscribers.borrow().values().map(Vec::len).sum()
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }
}

impl<T: Clone> EventManager<T> {
    /// Records `payload` in history, then calls every handler of `event_name` with it.
    ///
    /// Recording first keeps history in emission order when a handler emits.
    /// A handler that errors or panics is reported to the failure sink and the
    /// remaining handlers still run.
    pub fn emit(&self, event_name: &str, payload: T) {
        self.record(event_name, &payload);
        let snapshot: Vec<(SubscriptionId, EventCallback<T>)> = match self.subscribers.borrow().get(event_name) {
            Some(callbacks) => callbacks.iter().map(|(id, cb)| (*id, Rc::clone(cb))).collect(),
            None => Vec::new(),
        };
        for (id, callback) in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&payload)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => HandlerFailure::Error(err.to_string()),
                Err(cause) => HandlerFailure::Panic(panic_message(cause.as_ref())),
            };
            self.sink.handler_failed(event_name, id, &failure);
        }
    }

    fn record(&self, event_name: &str, payload: &T) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.borrow_mut();
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(HistoryEntry {
            event_name: event_name.to_string(),
            payload: payload.clone(),
            timestamp: now_millis(),
        });
    }

    /// Retained events, oldest first. The returned vector is a copy.
    pub fn event_history(&self) -> Vec<HistoryEntry<T>> {
        self.history.borrow().iter().cloned().collect()
    }
}

impl<T> Default for EventManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("listeners", &self.listener_counts())
            .field("history_len", &self.history.borrow().len())
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

/// Text of a panic payload from `panic!` with a literal or formatted message.
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic payload")
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
