//! Typed selection input
//!
//! Turns the start/end text boxes of the range widget into a validated
//! selection change request. Values typed by the user are absolute (display)
//! timestamps; the request carries session-relative bounds.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::events::{EventBus, RangeEvent};
use crate::range::{parse_timestamp, TimelineRange, Timestamp};
use crate::store::{RangeStore, SessionRangeRecord};

/// The two editable bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputField {
    Start,
    End,
}

impl InputField {
    fn name(self) -> &'static str {
        match self {
            InputField::Start => "start",
            InputField::End => "end",
        }
    }
}

/// Selection bounds formatted for the text boxes, lesser value first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayBounds {
    pub start: String,
    pub end: String,
}

/// Result of submitting the typed values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Nothing was typed; input state was reset
    Empty,
    /// A change request was published with these session-relative bounds
    Accepted(TimelineRange),
    /// At least one bound lies outside the session
    Rejected { start_valid: bool, end_valid: bool },
}

#[derive(Debug)]
struct InputState {
    start: Option<String>,
    end: Option<String>,
    start_valid: bool,
    end_valid: bool,
    editing: bool,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            start_valid: true,
            end_valid: true,
            editing: false,
        }
    }
}

/// Validator behind the selection start/end inputs
pub struct SelectionInputValidator {
    bus: Arc<EventBus>,
    state: Mutex<InputState>,
}

impl SelectionInputValidator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            state: Mutex::new(InputState::default()),
        }
    }

    /// Store the text typed into one field. Empty text means "not entered".
    pub fn set_input(&self, field: InputField, text: &str) {
        let value = (!text.is_empty()).then(|| text.to_string());
        let mut state = self.state.lock();
        match field {
            InputField::Start => state.start = value,
            InputField::End => state.end = value,
        }
        state.editing = true;
    }

    pub fn input_text(&self, field: InputField) -> Option<String> {
        let state = self.state.lock();
        match field {
            InputField::Start => state.start.clone(),
            InputField::End => state.end.clone(),
        }
    }

    pub fn is_valid(&self, field: InputField) -> bool {
        let state = self.state.lock();
        match field {
            InputField::Start => state.start_valid,
            InputField::End => state.end_valid,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.state.lock().editing
    }

    /// Forget typed values and error flags
    pub fn cancel(&self) {
        *self.state.lock() = InputState::default();
    }

    /// Current selection as shown in the text boxes
    pub fn get_start_and_end(record: &SessionRangeRecord) -> Option<DisplayBounds> {
        display_pair(record).map(|(start, end)| DisplayBounds {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    /// Validate against the active session of `store`
    pub fn submit_active(&self, store: &RangeStore) -> Result<ValidationOutcome> {
        if self.nothing_entered() {
            self.cancel();
            return Ok(ValidationOutcome::Empty);
        }
        let record = store.active().ok_or(CoreError::NoActiveSession)?;
        self.submit(&record)
    }

    /// Validate the typed values against `record` and, when both bounds are
    /// inside the session, publish a selection change request.
    pub fn submit(&self, record: &SessionRangeRecord) -> Result<ValidationOutcome> {
        let (start_text, end_text) = {
            let state = self.state.lock();
            (state.start.clone(), state.end.clone())
        };

        let start = parse_field(InputField::Start, start_text.as_deref());
        let end = parse_field(InputField::End, end_text.as_deref());
        if start.is_err() || end.is_err() {
            let mut state = self.state.lock();
            state.start_valid = start.is_ok();
            state.end_valid = end.is_ok();
            state.editing = true;
        }
        let (start, end) = (start?, end?);

        let (start, end) = match (start, end, display_pair(record)) {
            (None, None, _) => {
                self.cancel();
                return Ok(ValidationOutcome::Empty);
            }
            (Some(start), Some(end), _) => (start, end),
            (start, end, Some((current_start, current_end))) => {
                (start.unwrap_or(current_start), end.unwrap_or(current_end))
            }
            // No selection yet: a single typed value becomes a point selection
            (Some(value), None, None) | (None, Some(value), None) => (value, value),
        };

        let offset = record.offset();
        let absolute_end = record.absolute_end();
        let in_bounds = |value: Timestamp| offset <= value && value <= absolute_end;
        let start_valid = in_bounds(start);
        let end_valid = in_bounds(end);

        if start_valid && end_valid {
            let range = TimelineRange::new(start.saturating_sub(offset), end.saturating_sub(offset));
            debug!(session = %record.id, %range, "Requesting selection change from typed input");
            self.cancel();
            self.bus.publish(RangeEvent::SelectionRangeChangeRequested {
                session_id: record.id.clone(),
                range,
            });
            Ok(ValidationOutcome::Accepted(range))
        } else {
            let mut state = self.state.lock();
            state.start_valid = start_valid;
            state.end_valid = end_valid;
            state.editing = true;
            Ok(ValidationOutcome::Rejected {
                start_valid,
                end_valid,
            })
        }
    }

    fn nothing_entered(&self) -> bool {
        let state = self.state.lock();
        state.start.is_none() && state.end.is_none()
    }
}

fn parse_field(field: InputField, text: Option<&str>) -> Result<Option<Timestamp>> {
    text.map(|t| parse_timestamp(field.name(), t)).transpose()
}

/// Selection bounds in ascending order with the session offset applied
fn display_pair(record: &SessionRangeRecord) -> Option<(Timestamp, Timestamp)> {
    let selection = record.selection_range?.normalized();
    let offset = record.offset();
    Some((
        selection.raw_start().saturating_add(offset),
        selection.raw_end().saturating_add(offset),
    ))
}
