//! Scripted replay of range signals

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};
use tv_core::{
    handler_from_fn, ActiveRangeView, EventBus, InputField, PersistedRanges, RangeCoordinator,
    RangeEvent, RangeEventKind, RangeStore, SelectionInputValidator, ValidationOutcome,
};

/// A replay script
#[derive(Debug, Deserialize)]
pub struct Script {
    /// Store contents to start from
    #[serde(default)]
    pub restore: Option<PersistedRanges>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Publish an event as if a widget fired it
    Publish(RangeEvent),
    /// Type selection bounds and press enter
    TypeSelection {
        #[serde(default)]
        start: String,
        #[serde(default)]
        end: String,
    },
    /// Print what the range widget shows
    Print,
}

/// Wires the core together for a replay
pub struct Replay {
    bus: Arc<EventBus>,
    store: Arc<RangeStore>,
    coordinator: Arc<RangeCoordinator>,
    validator: SelectionInputValidator,
}

impl Replay {
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(RangeStore::new());
        let coordinator = RangeCoordinator::new(store.clone(), bus.clone());
        let validator = SelectionInputValidator::new(bus.clone());

        // Play the chart's part: honour selection requests and report back
        let weak_bus = Arc::downgrade(&bus);
        bus.subscribe(
            RangeEventKind::SelectionRangeChangeRequested,
            handler_from_fn(move |event| {
                if let (Some(bus), RangeEvent::SelectionRangeChangeRequested { session_id, range }) =
                    (weak_bus.upgrade(), event)
                {
                    bus.publish(RangeEvent::SelectionRangeUpdated {
                        session_id: session_id.clone(),
                        range: *range,
                    });
                }
            }),
        );

        Self {
            bus,
            store,
            coordinator,
            validator,
        }
    }

    /// Run every step, returning the printed lines
    pub fn run(&self, script: Script) -> Result<Vec<String>> {
        if let Some(persisted) = script.restore {
            self.store.restore_persisted(persisted);
        }
        self.coordinator.init();

        let mut output = Vec::new();
        for (number, step) in script.steps.into_iter().enumerate() {
            match step {
                Step::Publish(event) => self.bus.publish(event),
                Step::TypeSelection { start, end } => {
                    self.validator.set_input(InputField::Start, &start);
                    self.validator.set_input(InputField::End, &end);
                    let outcome = self
                        .validator
                        .submit_active(&self.store)
                        .with_context(|| format!("Step {} rejected typed selection", number + 1))?;
                    match outcome {
                        ValidationOutcome::Rejected {
                            start_valid,
                            end_valid,
                        } => {
                            warn!(start_valid, end_valid, "Typed selection is outside the session");
                            self.validator.cancel();
                        }
                        other => info!(?other, "Typed selection applied"),
                    }
                }
                Step::Print => output.push(describe(self.coordinator.displayed().as_ref())),
            }
        }
        Ok(output)
    }

    pub fn saved_state(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.store.snapshot()).context("Failed to serialize ranges")
    }
}

fn describe(view: Option<&ActiveRangeView>) -> String {
    let Some(view) = view else {
        return "no active session".to_string();
    };
    let bounds = |range: Option<tv_core::TimelineRange>| match range {
        Some(range) => format!("{}..{}", range.start(), range.end()),
        None => "-".to_string(),
    };
    format!(
        "{}: absolute {} view {} selection {}",
        view.session_id,
        bounds(view.absolute_range),
        bounds(view.view_range),
        bounds(view.selection_range)
    )
}
