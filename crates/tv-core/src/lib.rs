//! Time-range coordination for the trace viewer
//!
//! This crate tracks the absolute, view and selection ranges of every open
//! trace session, keeps widgets in agreement about them, validates typed
//! selection bounds and provides undo/redo over a time graph's navigation.

pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod events;
pub mod history;
pub mod input;
pub mod range;
pub mod settings;
pub mod store;

// Re-export commonly used types
pub use coordinator::{ActiveRangeView, RangeCoordinator, RangeDisplaySubscriber};
pub use error::{CoreError, Result};
pub use events::{handler_from_fn, EventBus, EventHandler, RangeEvent, RangeEventKind, SubscriptionId};
pub use history::{HistoryHandler, HistoryItem, RangeChangeSubscriber, RangeController, UnitController};
pub use input::{DisplayBounds, InputField, SelectionInputValidator, ValidationOutcome};
pub use range::{SerializedRange, TimelineRange, Timestamp};
pub use settings::CoordinationSettings;
pub use store::{PersistedRanges, RangePatch, RangeStore, SessionRangeRecord, SessionRef, SessionSnapshot};
