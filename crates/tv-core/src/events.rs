//! Typed event bus for range signals
//!
//! Every signal that crosses the coordination core is a [`RangeEvent`]
//! variant. Handlers subscribe per [`RangeEventKind`]; publishing is
//! synchronous on the caller's thread and a handler may publish again from
//! inside `handle` (nested dispatch runs depth-first).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::range::TimelineRange;
use crate::store::{SessionRef, SessionSnapshot};

/// Signals exchanged between widgets and the coordination core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RangeEvent {
    /// A chart panned or zoomed
    ViewRangeUpdated {
        session_id: String,
        range: TimelineRange,
    },
    /// A widget changed the selection
    SelectionRangeUpdated {
        session_id: String,
        range: TimelineRange,
    },
    /// Focus moved to a session, or away from all of them
    SessionSelected { session: Option<SessionSnapshot> },
    /// Session metadata (bounds) changed
    SessionUpdated { session: SessionSnapshot },
    SessionClosed { session: SessionRef },
    /// Validated user input asking widgets to move the selection
    SelectionRangeChangeRequested {
        session_id: String,
        range: TimelineRange,
    },
}

/// Discriminant used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeEventKind {
    ViewRangeUpdated,
    SelectionRangeUpdated,
    SessionSelected,
    SessionUpdated,
    SessionClosed,
    SelectionRangeChangeRequested,
}

impl RangeEventKind {
    pub const ALL: [RangeEventKind; 6] = [
        RangeEventKind::ViewRangeUpdated,
        RangeEventKind::SelectionRangeUpdated,
        RangeEventKind::SessionSelected,
        RangeEventKind::SessionUpdated,
        RangeEventKind::SessionClosed,
        RangeEventKind::SelectionRangeChangeRequested,
    ];
}

impl RangeEvent {
    pub fn kind(&self) -> RangeEventKind {
        match self {
            RangeEvent::ViewRangeUpdated { .. } => RangeEventKind::ViewRangeUpdated,
            RangeEvent::SelectionRangeUpdated { .. } => RangeEventKind::SelectionRangeUpdated,
            RangeEvent::SessionSelected { .. } => RangeEventKind::SessionSelected,
            RangeEvent::SessionUpdated { .. } => RangeEventKind::SessionUpdated,
            RangeEvent::SessionClosed { .. } => RangeEventKind::SessionClosed,
            RangeEvent::SelectionRangeChangeRequested { .. } => {
                RangeEventKind::SelectionRangeChangeRequested
            }
        }
    }
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &RangeEvent);
}

/// Token returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type HandlerList = Vec<(SubscriptionId, Arc<dyn EventHandler>)>;

/// Bus shared by the core and the widgets around it
pub struct EventBus {
    handlers: Mutex<AHashMap<RangeEventKind, HandlerList>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(AHashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to events of one kind
    pub fn subscribe(&self, kind: RangeEventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.subscribe_many(&[kind], handler)
    }

    /// Subscribe one handler to several kinds under a single token
    pub fn subscribe_many(
        &self,
        kinds: &[RangeEventKind],
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.lock();
        for kind in kinds {
            handlers
                .entry(*kind)
                .or_default()
                .push((id, handler.clone()));
        }
        id
    }

    /// Subscribe to every kind
    pub fn subscribe_all(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.subscribe_many(&RangeEventKind::ALL, handler)
    }

    /// Remove every registration made under `id`
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut handlers = self.handlers.lock();
        for list in handlers.values_mut() {
            list.retain(|(subscription, _)| *subscription != id);
        }
    }

    /// Publish an event to the handlers registered for its kind
    pub fn publish(&self, event: RangeEvent) {
        // Snapshot so handlers can publish or unsubscribe while we dispatch
        let targets: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .lock()
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        trace!(kind = ?event.kind(), handlers = targets.len(), "Publishing range event");
        for handler in targets {
            handler.handle(&event);
        }
    }

    pub fn handler_count(&self, kind: RangeEventKind) -> usize {
        self.handlers.lock().get(&kind).map(Vec::len).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: Fn(&RangeEvent) + Send + Sync,
{
    fn handle(&self, event: &RangeEvent) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&RangeEvent) + Send + Sync + 'static,
{
    Arc::new(ClosureEventHandler { handler: f })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &EventBus, kind: RangeEventKind) -> (Arc<Mutex<Vec<RangeEvent>>>, SubscriptionId) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = bus.subscribe(kind, handler_from_fn(move |event| sink.lock().push(event.clone())));
        (seen, id)
    }

    fn view_event(id: &str, start: i128) -> RangeEvent {
        RangeEvent::ViewRangeUpdated {
            session_id: id.to_string(),
            range: TimelineRange::new(start, start + 10),
        }
    }

    #[test]
    fn test_publish_reaches_matching_kind_only() {
        let bus = EventBus::new();
        let (views, _) = recorder(&bus, RangeEventKind::ViewRangeUpdated);
        let (closes, _) = recorder(&bus, RangeEventKind::SessionClosed);

        bus.publish(view_event("a", 0));
        bus.publish(view_event("a", 5));

        assert_eq!(views.lock().len(), 2);
        assert!(closes.lock().is_empty());
        assert_eq!(views.lock()[1], view_event("a", 5));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (views, id) = recorder(&bus, RangeEventKind::ViewRangeUpdated);
        bus.unsubscribe(id);
        bus.publish(view_event("a", 0));
        assert!(views.lock().is_empty());
        assert_eq!(bus.handler_count(RangeEventKind::ViewRangeUpdated), 0);
    }

    #[test]
    fn test_handler_can_publish_while_dispatching() {
        let bus = Arc::new(EventBus::new());
        let (requests, _) = recorder(&bus, RangeEventKind::SelectionRangeUpdated);

        let weak = Arc::downgrade(&bus);
        bus.subscribe(
            RangeEventKind::SelectionRangeChangeRequested,
            handler_from_fn(move |event| {
                if let (Some(bus), RangeEvent::SelectionRangeChangeRequested { session_id, range }) =
                    (weak.upgrade(), event)
                {
                    bus.publish(RangeEvent::SelectionRangeUpdated {
                        session_id: session_id.clone(),
                        range: *range,
                    });
                }
            }),
        );

        bus.publish(RangeEvent::SelectionRangeChangeRequested {
            session_id: "a".to_string(),
            range: TimelineRange::new(1, 2),
        });
        assert_eq!(requests.lock().len(), 1);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&RangeEvent::SessionClosed {
            session: SessionRef::Id("exp-1".to_string()),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"session_closed","session":"exp-1"}"#);
    }
}
