//! Synchronous publish/subscribe hub.
//!
//! The bus delivers every published event, in registration order, to the
//! subscribers of that event's kind. Delivery happens on the publishing
//! thread; a publish issued from inside a callback is fully delivered
//! before the outer delivery resumes, so effects always arrive after their
//! cause. Subscriber failures are isolated: they are logged, turned into a
//! synthesized [`EventKind::Error`] event, and never abort delivery to the
//! remaining subscribers.

use log::{debug, error, info};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use thiserror::Error;

use super::{EventKind, EventPayload, EventSource, GameEvent};
use crate::game::constants::MAX_EVENT_HISTORY;

/// Bus misconfiguration. Unlike subscriber failures, these indicate a
/// programming defect and propagate to the caller.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BusError {
    #[error("no subscriber slot registered for event kind {0}")]
    UnregisteredKind(EventKind),
}

/// Handle returned by `subscribe`/`subscribe_all`, used to unsubscribe.
pub type SubscriberId = u64;

/// A consumer of bus events.
///
/// `handle_event` failures are caught by the bus and converted into
/// synthesized error events; they never propagate to the publisher.
pub trait EventObserver {
    fn handle_event(&self, event: &GameEvent) -> anyhow::Result<()>;

    /// Identity carried in synthesized error events and log lines.
    fn name(&self) -> &str {
        "observer"
    }
}

struct FnObserver<F> {
    name: String,
    callback: F,
}

impl<F> EventObserver for FnObserver<F>
where
    F: Fn(&GameEvent) -> anyhow::Result<()>,
{
    fn handle_event(&self, event: &GameEvent) -> anyhow::Result<()> {
        (self.callback)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone)]
struct Registration {
    id: SubscriberId,
    observer: Rc<dyn EventObserver>,
}

/// Typed publish/subscribe hub with bounded history.
///
/// Single-threaded by design: interior mutability keeps `publish` callable
/// through a shared reference so callbacks can re-enter the bus.
pub struct EventBus {
    subscribers: RefCell<HashMap<EventKind, Vec<Registration>>>,
    history: RefCell<VecDeque<GameEvent>>,
    next_id: Cell<SubscriberId>,
    max_history: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENT_HISTORY)
    }

    /// A bus whose history holds at most `max_history` events.
    #[must_use]
    pub fn with_capacity(max_history: usize) -> Self {
        let mut subscribers = HashMap::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            subscribers.insert(kind, Vec::new());
        }
        Self {
            subscribers: RefCell::new(subscribers),
            history: RefCell::new(VecDeque::with_capacity(max_history)),
            next_id: Cell::new(0),
            max_history,
        }
    }

    fn fresh_id(&self) -> SubscriberId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Register an observer for a single event kind.
    pub fn subscribe(&self, kind: EventKind, observer: Rc<dyn EventObserver>) -> SubscriberId {
        let id = self.fresh_id();
        debug!("subscribed to {kind}: {}", observer.name());
        self.subscribers
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push(Registration { id, observer });
        id
    }

    /// Register a plain function for a single event kind.
    pub fn subscribe_fn<F>(&self, kind: EventKind, name: &str, callback: F) -> SubscriberId
    where
        F: Fn(&GameEvent) -> anyhow::Result<()> + 'static,
    {
        self.subscribe(
            kind,
            Rc::new(FnObserver {
                name: name.to_string(),
                callback,
            }),
        )
    }

    /// Register one observer for every event kind. The returned id removes
    /// it everywhere via [`EventBus::unsubscribe_all`].
    pub fn subscribe_all(&self, observer: Rc<dyn EventObserver>) -> SubscriberId {
        let id = self.fresh_id();
        let mut subscribers = self.subscribers.borrow_mut();
        for kind in EventKind::ALL {
            subscribers.entry(kind).or_default().push(Registration {
                id,
                observer: Rc::clone(&observer),
            });
        }
        info!("observer {} subscribed to all events", observer.name());
        id
    }

    /// Remove a subscriber from one kind. Unknown ids are ignored.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriberId) {
        if let Some(entries) = self.subscribers.borrow_mut().get_mut(&kind) {
            entries.retain(|r| r.id != id);
            debug!("unsubscribed {id} from {kind}");
        }
    }

    /// Remove a subscriber from every kind.
    pub fn unsubscribe_all(&self, id: SubscriberId) {
        let mut subscribers = self.subscribers.borrow_mut();
        for entries in subscribers.values_mut() {
            entries.retain(|r| r.id != id);
        }
        info!("subscriber {id} unsubscribed from all events");
    }

    /// Publish an event: record it in history, then deliver it to every
    /// subscriber of its kind in registration order.
    ///
    /// Delivery runs over a snapshot of the subscriber list taken here, so
    /// subscriptions changed by a callback take effect on the next publish,
    /// not the one in flight.
    ///
    /// # Errors
    ///
    /// Only [`BusError::UnregisteredKind`]; subscriber failures are
    /// isolated and never surface here.
    pub fn publish(&self, event: GameEvent) -> Result<(), BusError> {
        let kind = event.kind();
        self.record(event.clone());
        info!("event published: {event}");
        if let Ok(json) = serde_json::to_string(&event.payload) {
            debug!("event payload: {json}");
        }

        let snapshot = {
            let subscribers = self.subscribers.borrow();
            let Some(entries) = subscribers.get(&kind) else {
                return Err(BusError::UnregisteredKind(kind));
            };
            entries.clone()
        };

        for registration in snapshot {
            if let Err(failure) = registration.observer.handle_event(&event) {
                self.isolate_failure(&event, registration.observer.name(), &failure);
            }
        }
        Ok(())
    }

    /// Convert a subscriber failure into a synthesized error event.
    ///
    /// Failures raised while delivering an error event are only logged,
    /// never re-synthesized, so a broken error handler cannot recurse.
    fn isolate_failure(&self, event: &GameEvent, subscriber: &str, failure: &anyhow::Error) {
        error!("error in subscriber {subscriber} handling {}: {failure:#}", event.kind());
        if event.kind() == EventKind::Error {
            return;
        }

        let payload = EventPayload::Error {
            error_kind: failure
                .chain()
                .last()
                .map_or_else(|| "unknown".to_string(), |root| format!("{root}")),
            message: format!("{failure}"),
            original_kind: event.kind(),
            original_payload: serde_json::to_string(&event.payload).unwrap_or_default(),
            subscriber: subscriber.to_string(),
        };
        let error_event = GameEvent::new(payload, EventSource::EventBus);
        if let Err(bus_error) = self.publish(error_event) {
            error!("failed to publish synthesized error event: {bus_error}");
        }
    }

    fn record(&self, event: GameEvent) {
        let mut history = self.history.borrow_mut();
        history.push_back(event);
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// The most recent events, oldest first. `count` limits the result to
    /// the last N entries; `kind` filters before the limit is applied.
    /// `Some(0)` means none: pass `None` for the full history.
    #[must_use]
    pub fn recent_events(&self, count: Option<usize>, kind: Option<EventKind>) -> Vec<GameEvent> {
        let history = self.history.borrow();
        let filtered: Vec<GameEvent> = history
            .iter()
            .filter(|e| kind.is_none_or(|k| e.kind() == k))
            .cloned()
            .collect();
        match count {
            Some(n) if n < filtered.len() => filtered[filtered.len() - n..].to_vec(),
            _ => filtered,
        }
    }

    /// Occurrence count per kind over the retained history. Kinds that have
    /// not occurred are present with a count of zero.
    #[must_use]
    pub fn event_counts(&self) -> HashMap<EventKind, usize> {
        let mut counts: HashMap<EventKind, usize> =
            EventKind::ALL.iter().map(|&k| (k, 0)).collect();
        for event in self.history.borrow().iter() {
            if let Some(count) = counts.get_mut(&event.kind()) {
                *count += 1;
            }
        }
        counts
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.borrow().len()
    }

    pub fn clear_history(&self) {
        self.history.borrow_mut().clear();
        info!("event history cleared");
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("history_len", &self.history.borrow().len())
            .field("max_history", &self.max_history)
            .finish_non_exhaustive()
    }
}
