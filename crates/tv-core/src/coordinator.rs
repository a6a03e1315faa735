//! Range update coordinator
//!
//! Bridges range signals on the [`EventBus`] into the [`RangeStore`] and
//! refreshes the displayed ranges whenever the active session changes.

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::events::{EventBus, EventHandler, RangeEvent, RangeEventKind, SubscriptionId};
use crate::history::HistoryHandler;
use crate::range::TimelineRange;
use crate::store::{RangeStore, SessionRangeRecord};

/// Ranges of the active session in display form (offset applied)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRangeView {
    pub session_id: String,
    pub absolute_range: Option<TimelineRange>,
    pub view_range: Option<TimelineRange>,
    pub selection_range: Option<TimelineRange>,
}

impl ActiveRangeView {
    pub fn from_record(record: &SessionRangeRecord) -> Self {
        Self {
            session_id: record.id.clone(),
            absolute_range: record.absolute_range,
            view_range: record.display_view_range(),
            selection_range: record.display_selection_range(),
        }
    }
}

/// Trait for widgets that render the active session's ranges
pub trait RangeDisplaySubscriber: Send + Sync {
    /// Called with the new display state; `None` when no session is active
    fn on_active_ranges_changed(&self, view: Option<&ActiveRangeView>);
}

/// Applies inbound range signals to the store
pub struct RangeCoordinator {
    store: Arc<RangeStore>,
    bus: Arc<EventBus>,
    displayed: RwLock<Option<ActiveRangeView>>,
    subscribers: RwLock<Vec<Weak<dyn RangeDisplaySubscriber>>>,
    subscription: Mutex<Option<SubscriptionId>>,
    histories: Mutex<AHashMap<String, Vec<Weak<HistoryHandler>>>>,
}

const INBOUND: [RangeEventKind; 5] = [
    RangeEventKind::ViewRangeUpdated,
    RangeEventKind::SelectionRangeUpdated,
    RangeEventKind::SessionSelected,
    RangeEventKind::SessionUpdated,
    RangeEventKind::SessionClosed,
];

struct CoordinatorHandler {
    coordinator: Weak<RangeCoordinator>,
}

impl EventHandler for CoordinatorHandler {
    fn handle(&self, event: &RangeEvent) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.handle_event(event);
        }
    }
}

impl RangeCoordinator {
    /// Create a coordinator over a store and bus. Call [`init`](Self::init)
    /// to start listening.
    pub fn new(store: Arc<RangeStore>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            displayed: RwLock::new(None),
            subscribers: RwLock::new(Vec::new()),
            subscription: Mutex::new(None),
            histories: Mutex::new(AHashMap::new()),
        })
    }

    /// Subscribe to the bus. Calling twice is a no-op.
    pub fn init(self: &Arc<Self>) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }
        let handler = Arc::new(CoordinatorHandler {
            coordinator: Arc::downgrade(self),
        });
        *subscription = Some(self.bus.subscribe_many(&INBOUND, handler));
        drop(subscription);
        // Pick up whatever the store already holds (e.g. after a restore)
        self.refresh();
    }

    /// Unsubscribe from the bus
    pub fn dispose(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.bus.unsubscribe(id);
        }
    }

    pub fn store(&self) -> &Arc<RangeStore> {
        &self.store
    }

    /// Add a display subscriber. Held weakly.
    pub fn add_subscriber(&self, subscriber: Arc<dyn RangeDisplaySubscriber>) {
        self.subscribers.write().push(Arc::downgrade(&subscriber));
    }

    /// Tie a history handler to a session so closing the session disposes
    /// it. Held weakly.
    pub fn attach_history(&self, session_id: &str, history: &Arc<HistoryHandler>) {
        let mut histories = self.histories.lock();
        let attached = histories.entry(session_id.to_string()).or_default();
        attached.retain(|weak| weak.strong_count() > 0);
        attached.push(Arc::downgrade(history));
    }

    /// What is currently shown for the active session
    pub fn displayed(&self) -> Option<ActiveRangeView> {
        self.displayed.read().clone()
    }

    /// Apply one event to the store
    pub fn handle_event(&self, event: &RangeEvent) {
        let refresh = match event {
            RangeEvent::ViewRangeUpdated { session_id, range } => {
                self.store.update_view_range(session_id, *range)
            }
            RangeEvent::SelectionRangeUpdated { session_id, range } => {
                self.store.update_selection_range(session_id, *range)
            }
            RangeEvent::SessionUpdated { session } => self.store.update_absolute_range(session),
            RangeEvent::SessionSelected { session } => {
                match session {
                    Some(session) => {
                        self.store.update_absolute_range(session);
                        self.store.set_active(Some(&session.id));
                    }
                    None => self.store.set_active(None),
                }
                true
            }
            RangeEvent::SessionClosed { session } => {
                let was_active = self.store.is_active(session.id());
                self.store.delete(session.clone());
                self.dispose_histories(session.id());
                was_active
            }
            RangeEvent::SelectionRangeChangeRequested { .. } => false,
        };

        if refresh {
            self.refresh();
        }
    }

    fn dispose_histories(&self, session_id: &str) {
        let attached = self.histories.lock().remove(session_id).unwrap_or_default();
        for history in attached.iter().filter_map(Weak::upgrade) {
            debug!(session = session_id, "Disposing history of closed session");
            history.dispose();
        }
    }

    /// Re-read the active record by id and publish it if it changed
    pub fn refresh(&self) {
        let view = {
            // Read and publish under one lock so a slower refresh cannot
            // overwrite a newer view with the one it read earlier
            let mut displayed = self.displayed.write();
            let view = self.store.active().map(|record| ActiveRangeView::from_record(&record));
            if *displayed == view {
                return;
            }
            *displayed = view.clone();
            view
        };
        debug!(session = ?view.as_ref().map(|v| v.session_id.as_str()), "Refreshing active ranges");
        self.notify_subscribers(view.as_ref());
    }

    fn notify_subscribers(&self, view: Option<&ActiveRangeView>) {
        let live: Vec<Arc<dyn RangeDisplaySubscriber>> = {
            let mut subscribers = self.subscribers.write();
            // Remove any dead weak references
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for subscriber in live {
            subscriber.on_active_ranges_changed(view);
        }
    }
}

impl Drop for RangeCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{RangeController, UnitController};
    use crate::settings::CoordinationSettings;
    use crate::store::SessionSnapshot;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingDisplay {
        views: Mutex<Vec<Option<ActiveRangeView>>>,
    }

    impl RangeDisplaySubscriber for RecordingDisplay {
        fn on_active_ranges_changed(&self, view: Option<&ActiveRangeView>) {
            self.views.lock().push(view.cloned());
        }
    }

    fn setup() -> (Arc<EventBus>, Arc<RangeCoordinator>, Arc<RecordingDisplay>) {
        let bus = Arc::new(EventBus::new());
        let coordinator = RangeCoordinator::new(Arc::new(RangeStore::new()), bus.clone());
        coordinator.init();
        let display = Arc::new(RecordingDisplay::default());
        coordinator.add_subscriber(display.clone());
        (bus, coordinator, display)
    }

    fn select(bus: &EventBus, id: &str, start: i128, end: i128) {
        bus.publish(RangeEvent::SessionSelected {
            session: Some(SessionSnapshot::new(id, start, end)),
        });
    }

    #[test]
    fn test_inactive_updates_do_not_refresh() {
        let (bus, coordinator, display) = setup();
        select(&bus, "a", 0, 100);
        bus.publish(RangeEvent::SessionUpdated {
            session: SessionSnapshot::new("b", 1000, 2000),
        });
        assert_eq!(display.views.lock().len(), 1);

        bus.publish(RangeEvent::ViewRangeUpdated {
            session_id: "b".to_string(),
            range: TimelineRange::new(10, 20),
        });
        assert_eq!(display.views.lock().len(), 1);
        assert_eq!(coordinator.displayed().unwrap().session_id, "a");

        select(&bus, "b", 1000, 2000);
        let shown = coordinator.displayed().unwrap();
        assert_eq!(shown.session_id, "b");
        let view = shown.view_range.unwrap();
        assert_eq!((view.start(), view.end()), (1010, 1020));
        assert_eq!(display.views.lock().len(), 2);
    }

    #[test]
    fn test_active_updates_refresh_once_per_change() {
        let (bus, coordinator, display) = setup();
        select(&bus, "a", 0, 100);
        let event = RangeEvent::SelectionRangeUpdated {
            session_id: "a".to_string(),
            range: TimelineRange::new(5, 6),
        };
        bus.publish(event.clone());
        bus.publish(event);

        assert_eq!(display.views.lock().len(), 2);
        assert_eq!(
            coordinator.displayed().unwrap().selection_range,
            Some(TimelineRange::with_offset(5, 6, Some(0)))
        );
    }

    #[test]
    fn test_closing_active_clears_display() {
        let (bus, coordinator, display) = setup();
        select(&bus, "a", 0, 100);
        bus.publish(RangeEvent::SessionClosed { session: "a".into() });

        assert!(coordinator.store().get("a").is_none());
        assert!(coordinator.displayed().is_none());
        assert_eq!(display.views.lock().last().cloned(), Some(None));
    }

    #[test]
    fn test_deselect_clears_active() {
        let (bus, coordinator, _display) = setup();
        select(&bus, "a", 0, 100);
        bus.publish(RangeEvent::SessionSelected { session: None });
        assert!(coordinator.store().active_id().is_none());
        assert!(coordinator.store().get("a").is_some());
        assert!(coordinator.displayed().is_none());
    }

    #[test]
    fn test_dispose_stops_listening() {
        let (bus, coordinator, _display) = setup();
        coordinator.dispose();
        select(&bus, "a", 0, 100);
        assert!(coordinator.store().is_empty());
        assert_eq!(bus.handler_count(RangeEventKind::SessionSelected), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_session_disposes_its_history() {
        let (bus, coordinator, _display) = setup();
        select(&bus, "a", 0, 100);

        let controller = Arc::new(RangeController::new(TimelineRange::new(0, 100)));
        let history = HistoryHandler::new(
            controller.clone(),
            tokio::runtime::Handle::current(),
            &CoordinationSettings::default(),
        );
        coordinator.attach_history("a", &history);

        controller.set_view_range(TimelineRange::new(10, 110));
        assert!(history.has_pending_commit());
        bus.publish(RangeEvent::SessionClosed { session: "a".into() });
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(history.index(), 0);
        assert!(!history.has_pending_commit());
    }

    #[test]
    fn test_closing_other_session_keeps_history() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let (bus, coordinator, _display) = setup();
        let controller = Arc::new(RangeController::new(TimelineRange::new(0, 100)));
        let history = HistoryHandler::new(
            controller.clone(),
            runtime.handle().clone(),
            &CoordinationSettings::default(),
        );
        coordinator.attach_history("a", &history);

        bus.publish(RangeEvent::SessionClosed { session: "b".into() });
        controller.set_view_range(TimelineRange::new(10, 110));
        assert!(history.has_pending_commit());
    }

    #[test]
    fn test_concurrent_refreshes_settle_on_latest_state() {
        let (bus, coordinator, _display) = setup();
        select(&bus, "a", 0, 1_000_000);
        let barrier = std::sync::Barrier::new(8);

        std::thread::scope(|scope| {
            for worker in 0..8i128 {
                let bus = &bus;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for step in 0..200i128 {
                        bus.publish(RangeEvent::ViewRangeUpdated {
                            session_id: "a".to_string(),
                            range: TimelineRange::new(worker * 1000 + step, worker * 1000 + step + 1),
                        });
                    }
                });
            }
        });

        let expected = coordinator
            .store()
            .active()
            .map(|record| ActiveRangeView::from_record(&record));
        assert_eq!(coordinator.displayed(), expected);
    }
}
