//! Undo/redo history for a unit controller
//!
//! The [`HistoryHandler`] listens to one controller's range changes and
//! commits `(selection, view)` snapshots after a quiet period. Undo and redo
//! write snapshots back onto the controller; the notifications that
//! assignment causes are ignored until the settle delay has passed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::debounce::Debouncer;
use crate::range::TimelineRange;
use crate::settings::CoordinationSettings;

/// Trait for components that react to a controller's range changes
pub trait RangeChangeSubscriber: Send + Sync {
    fn on_range_change(&self);
}

/// Live range state of one time graph
pub trait UnitController: Send + Sync {
    fn view_range(&self) -> TimelineRange;
    fn selection_range(&self) -> Option<TimelineRange>;
    fn set_view_range(&self, range: TimelineRange);
    fn set_selection_range(&self, range: Option<TimelineRange>);
    /// Register for change notifications. Held weakly.
    fn add_subscriber(&self, subscriber: Arc<dyn RangeChangeSubscriber>);
}

#[derive(Debug, Clone)]
struct ControllerState {
    view_range: TimelineRange,
    selection_range: Option<TimelineRange>,
}

/// In-process unit controller that notifies subscribers on every change
pub struct RangeController {
    state: RwLock<ControllerState>,
    subscribers: RwLock<Vec<Weak<dyn RangeChangeSubscriber>>>,
}

impl RangeController {
    pub fn new(view_range: TimelineRange) -> Self {
        Self {
            state: RwLock::new(ControllerState {
                view_range,
                selection_range: None,
            }),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    fn notify_subscribers(&self) {
        let live: Vec<Arc<dyn RangeChangeSubscriber>> = {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for subscriber in live {
            subscriber.on_range_change();
        }
    }
}

impl UnitController for RangeController {
    fn view_range(&self) -> TimelineRange {
        self.state.read().view_range
    }

    fn selection_range(&self) -> Option<TimelineRange> {
        self.state.read().selection_range
    }

    fn set_view_range(&self, range: TimelineRange) {
        let mut state = self.state.write();
        if state.view_range == range {
            return;
        }
        state.view_range = range;
        drop(state);
        self.notify_subscribers();
    }

    fn set_selection_range(&self, range: Option<TimelineRange>) {
        let mut state = self.state.write();
        if state.selection_range == range {
            return;
        }
        state.selection_range = range;
        drop(state);
        self.notify_subscribers();
    }

    fn add_subscriber(&self, subscriber: Arc<dyn RangeChangeSubscriber>) {
        self.subscribers.write().push(Arc::downgrade(&subscriber));
    }
}

/// One navigation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub selection_range: Option<TimelineRange>,
    pub view_range: TimelineRange,
}

impl HistoryItem {
    fn capture(controller: &dyn UnitController) -> Self {
        Self {
            selection_range: controller.selection_range(),
            view_range: controller.view_range(),
        }
    }

    /// Same selection and view bounds, offsets applied
    pub fn same_bounds(&self, other: &HistoryItem) -> bool {
        let bounds = |range: &TimelineRange| (range.start(), range.end());
        self.selection_range.as_ref().map(bounds) == other.selection_range.as_ref().map(bounds)
            && bounds(&self.view_range) == bounds(&other.view_range)
    }
}

#[derive(Debug, Default)]
struct HistoryState {
    // Position `n` lives at `items[n - 1]`; position 0 is "before any entry"
    items: Vec<HistoryItem>,
    index: usize,
    max_allowed_index: usize,
    pending: Option<HistoryItem>,
}

impl HistoryState {
    fn current(&self) -> Option<&HistoryItem> {
        self.index.checked_sub(1).and_then(|slot| self.items.get(slot))
    }

    fn commit_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(item) => self.add(item),
            None => false,
        }
    }

    fn step_back(&mut self) -> Option<HistoryItem> {
        if self.index <= 1 {
            return None;
        }
        self.index -= 1;
        self.current().cloned()
    }

    fn step_forward(&mut self) -> Option<HistoryItem> {
        if self.index >= self.max_allowed_index {
            return None;
        }
        self.index += 1;
        self.current().cloned()
    }

    fn add(&mut self, item: HistoryItem) -> bool {
        if self.current().is_some_and(|current| current.same_bounds(&item)) {
            trace!(index = self.index, "Dropping duplicate history entry");
            return false;
        }
        self.index += 1;
        self.max_allowed_index = self.index;
        let slot = self.index - 1;
        if slot < self.items.len() {
            self.items[slot] = item;
        } else {
            self.items.push(item);
        }
        trace!(index = self.index, "Committed history entry");
        true
    }
}

/// Debounced undo/redo stack over one [`UnitController`]
pub struct HistoryHandler {
    controller: Arc<dyn UnitController>,
    state: Arc<Mutex<HistoryState>>,
    restoring: Arc<AtomicBool>,
    disposed: AtomicBool,
    commit: Debouncer,
    settle: Debouncer,
}

impl HistoryHandler {
    /// Create a handler and subscribe it to the controller's changes
    pub fn new(
        controller: Arc<dyn UnitController>,
        handle: Handle,
        settings: &CoordinationSettings,
    ) -> Arc<Self> {
        let handler = Arc::new(Self {
            controller: controller.clone(),
            state: Arc::new(Mutex::new(HistoryState::default())),
            restoring: Arc::new(AtomicBool::new(false)),
            disposed: AtomicBool::new(false),
            commit: Debouncer::new(handle.clone(), settings.history_debounce()),
            settle: Debouncer::new(handle, settings.restore_settle()),
        });
        controller.add_subscriber(handler.clone());
        handler
    }

    /// Queue the controller's current ranges for a debounced commit
    pub fn record_current_state(&self) {
        if self.is_disposed() {
            return;
        }
        if self.restoring.load(Ordering::SeqCst) {
            trace!("Ignoring range change caused by undo/redo");
            return;
        }
        let item = HistoryItem::capture(self.controller.as_ref());
        self.state.lock().pending = Some(item);

        let state = self.state.clone();
        self.commit.schedule(move || {
            state.lock().commit_pending();
        });
    }

    /// Step back one entry. Returns false at the oldest entry.
    pub fn undo(&self) -> bool {
        if self.is_disposed() {
            return false;
        }
        let item = self.flush().step_back();
        self.apply(item, "Undo")
    }

    /// Step forward one entry. Returns false at the newest entry.
    pub fn redo(&self) -> bool {
        if self.is_disposed() {
            return false;
        }
        let item = self.flush().step_forward();
        self.apply(item, "Redo")
    }

    /// Forget all entries. Later commits overwrite from the start.
    pub fn clear(&self) {
        self.commit.cancel();
        let mut state = self.state.lock();
        state.pending = None;
        state.index = 0;
        state.max_allowed_index = 0;
    }

    /// Cancel pending timers and stop recording
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.commit.cancel();
        self.settle.cancel();
        self.state.lock().pending = None;
        self.restoring.store(false, Ordering::SeqCst);
    }

    pub fn can_undo(&self) -> bool {
        self.state.lock().index > 1
    }

    pub fn can_redo(&self) -> bool {
        let state = self.state.lock();
        state.index < state.max_allowed_index
    }

    pub fn index(&self) -> usize {
        self.state.lock().index
    }

    pub fn max_allowed_index(&self) -> usize {
        self.state.lock().max_allowed_index
    }

    /// Entry at the cursor
    pub fn current(&self) -> Option<HistoryItem> {
        self.state.lock().current().cloned()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::SeqCst)
    }

    pub fn has_pending_commit(&self) -> bool {
        self.commit.is_pending()
    }

    /// Commit a waiting snapshot now so undo starts from the latest state
    fn flush(&self) -> parking_lot::MutexGuard<'_, HistoryState> {
        self.commit.cancel();
        let mut state = self.state.lock();
        state.commit_pending();
        state
    }

    fn apply(&self, item: Option<HistoryItem>, action: &str) -> bool {
        let Some(item) = item else {
            return false;
        };
        debug!(index = self.index(), action, "Restoring history entry");
        self.restore(item);
        true
    }

    fn restore(&self, item: HistoryItem) {
        self.restoring.store(true, Ordering::SeqCst);
        let restoring = self.restoring.clone();
        self.settle.schedule(move || restoring.store(false, Ordering::SeqCst));

        self.controller.set_selection_range(item.selection_range);
        self.controller.set_view_range(item.view_range);
    }
}

impl RangeChangeSubscriber for HistoryHandler {
    fn on_range_change(&self) {
        self.record_current_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SETTLE: Duration = Duration::from_millis(600);

    fn setup() -> (Arc<RangeController>, Arc<HistoryHandler>) {
        let controller = Arc::new(RangeController::new(TimelineRange::new(0, 100)));
        let handler = HistoryHandler::new(
            controller.clone(),
            Handle::current(),
            &CoordinationSettings::default(),
        );
        (controller, handler)
    }

    async fn pan_to(controller: &RangeController, start: i128) {
        controller.set_view_range(TimelineRange::new(start, start + 100));
        tokio::time::sleep(SETTLE).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_commit_once() {
        let (controller, handler) = setup();
        for start in 1..=5 {
            controller.set_view_range(TimelineRange::new(start, start + 100));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(handler.index(), 0);
        assert!(handler.has_pending_commit());

        tokio::time::sleep(SETTLE).await;
        assert_eq!(handler.index(), 1);
        assert_eq!(handler.current().unwrap().view_range, TimelineRange::new(5, 105));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_state_is_suppressed() {
        let (_controller, handler) = setup();
        handler.record_current_state();
        tokio::time::sleep(SETTLE).await;
        assert_eq!(handler.max_allowed_index(), 1);

        handler.record_current_state();
        tokio::time::sleep(SETTLE).await;
        assert_eq!(handler.index(), 1);
        assert_eq!(handler.max_allowed_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_redo_walks_snapshots_in_order() {
        let (controller, handler) = setup();
        for start in [10, 20, 30] {
            pan_to(&controller, start).await;
        }
        assert_eq!(handler.index(), 3);
        assert!(!handler.redo());

        assert!(handler.undo());
        assert_eq!(controller.view_range(), TimelineRange::new(20, 120));
        assert!(handler.undo());
        assert_eq!(controller.view_range(), TimelineRange::new(10, 110));
        assert!(!handler.undo());
        assert!(!handler.can_undo());

        assert!(handler.redo());
        assert_eq!(controller.view_range(), TimelineRange::new(20, 120));
        assert!(handler.redo());
        assert_eq!(controller.view_range(), TimelineRange::new(30, 130));
        assert!(!handler.redo());

        // Assignments made by undo/redo never re-enter history
        tokio::time::sleep(SETTLE).await;
        assert_eq!(handler.index(), 3);
        assert_eq!(handler.max_allowed_index(), 3);
        assert!(!handler.is_restoring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_entry_after_undo_drops_redo() {
        let (controller, handler) = setup();
        for start in [10, 20, 30] {
            pan_to(&controller, start).await;
        }
        handler.undo();
        handler.undo();
        tokio::time::sleep(SETTLE).await;

        controller.set_selection_range(Some(TimelineRange::new(15, 18)));
        tokio::time::sleep(SETTLE).await;

        assert_eq!(handler.index(), 2);
        assert_eq!(handler.max_allowed_index(), 2);
        assert!(!handler.can_redo());
        assert_eq!(
            handler.current().unwrap().selection_range,
            Some(TimelineRange::new(15, 18))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_flushes_pending_change() {
        let (controller, handler) = setup();
        pan_to(&controller, 10).await;
        pan_to(&controller, 20).await;
        controller.set_view_range(TimelineRange::new(30, 130));

        assert!(handler.undo());
        assert_eq!(handler.max_allowed_index(), 3);
        assert_eq!(controller.view_range(), TimelineRange::new(20, 120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_restarts_from_first_slot() {
        let (controller, handler) = setup();
        pan_to(&controller, 10).await;
        pan_to(&controller, 20).await;
        handler.clear();
        assert_eq!(handler.index(), 0);
        assert!(handler.current().is_none());

        pan_to(&controller, 40).await;
        assert_eq!(handler.index(), 1);
        assert_eq!(handler.max_allowed_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_pending_commit() {
        let (controller, handler) = setup();
        controller.set_view_range(TimelineRange::new(5, 105));
        handler.dispose();
        tokio::time::sleep(SETTLE).await;

        assert_eq!(handler.index(), 0);
        controller.set_view_range(TimelineRange::new(6, 106));
        assert!(!handler.has_pending_commit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_handler_leaves_controller_alone() {
        let (controller, handler) = setup();
        pan_to(&controller, 10).await;
        pan_to(&controller, 20).await;
        handler.dispose();

        assert!(!handler.undo());
        assert!(!handler.redo());
        assert_eq!(controller.view_range(), TimelineRange::new(20, 120));
        assert!(!handler.is_restoring());
        assert_eq!(handler.index(), 2);
    }
}
