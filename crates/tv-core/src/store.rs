//! Per-session range store
//!
//! Tracks, for every open session, the absolute bounds, the visible view
//! range and the user selection, plus which session is active. Updates are
//! shallow patches: a field present in the patch replaces the stored field
//! wholesale, absent fields keep their stored value.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::range::{TimelineRange, Timestamp};

/// Session as reported by the session manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    #[serde(with = "timestamp_string")]
    pub absolute_start: Timestamp,
    #[serde(with = "timestamp_string")]
    pub absolute_end: Timestamp,
}

impl SessionSnapshot {
    pub fn new(id: impl Into<String>, absolute_start: Timestamp, absolute_end: Timestamp) -> Self {
        Self {
            id: id.into(),
            absolute_start,
            absolute_end,
        }
    }
}

/// Either a bare session id or a full snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionRef {
    Id(String),
    Snapshot(SessionSnapshot),
}

impl SessionRef {
    pub fn id(&self) -> &str {
        match self {
            SessionRef::Id(id) => id,
            SessionRef::Snapshot(snapshot) => &snapshot.id,
        }
    }
}

impl From<&str> for SessionRef {
    fn from(id: &str) -> Self {
        SessionRef::Id(id.to_string())
    }
}

impl From<String> for SessionRef {
    fn from(id: String) -> Self {
        SessionRef::Id(id)
    }
}

impl From<SessionSnapshot> for SessionRef {
    fn from(snapshot: SessionSnapshot) -> Self {
        SessionRef::Snapshot(snapshot)
    }
}

impl From<&SessionSnapshot> for SessionRef {
    fn from(snapshot: &SessionSnapshot) -> Self {
        SessionRef::Snapshot(snapshot.clone())
    }
}

/// Ranges known for one session. Every range is session-relative; the
/// absolute start is the offset that turns them into display values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRangeRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_range: Option<TimelineRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_range: Option<TimelineRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_range: Option<TimelineRange>,
}

impl SessionRangeRecord {
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Absolute start, or zero while the session bounds are unknown
    pub fn offset(&self) -> Timestamp {
        self.absolute_range.map(|range| range.start()).unwrap_or(0)
    }

    /// Absolute end, or zero while the session bounds are unknown
    pub fn absolute_end(&self) -> Timestamp {
        self.absolute_range.map(|range| range.end()).unwrap_or(0)
    }

    /// View range rebased onto the absolute start
    pub fn display_view_range(&self) -> Option<TimelineRange> {
        self.view_range.map(|range| range.rebased(Some(self.offset())))
    }

    /// Selection range rebased onto the absolute start
    pub fn display_selection_range(&self) -> Option<TimelineRange> {
        self.selection_range
            .map(|range| range.rebased(Some(self.offset())))
    }

    fn apply(&mut self, patch: RangePatch) {
        if let Some(range) = patch.absolute_range {
            self.absolute_range = Some(range);
        }
        if let Some(range) = patch.view_range {
            self.view_range = Some(range);
        }
        if let Some(range) = patch.selection_range {
            self.selection_range = Some(range);
        }
    }

    fn as_patch(&self) -> RangePatch {
        RangePatch {
            absolute_range: self.absolute_range,
            view_range: self.view_range,
            selection_range: self.selection_range,
        }
    }
}

/// Partial update for a session record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangePatch {
    pub absolute_range: Option<TimelineRange>,
    pub view_range: Option<TimelineRange>,
    pub selection_range: Option<TimelineRange>,
}

/// Serializable contents of a store, for workspace save/restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRanges {
    pub records: Vec<SessionRangeRecord>,
    #[serde(default)]
    pub active: Option<SessionRangeRecord>,
}

#[derive(Debug, Default)]
struct StoreState {
    records: IndexMap<String, SessionRangeRecord>,
    active: Option<String>,
}

impl StoreState {
    fn patch(&mut self, id: &str, patch: RangePatch) -> bool {
        self.records
            .entry(id.to_string())
            .or_insert_with(|| SessionRangeRecord::empty(id))
            .apply(patch);
        self.active.as_deref() == Some(id)
    }

    fn remove(&mut self, id: &str) -> Option<SessionRangeRecord> {
        let removed = self.records.shift_remove(id);
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        removed
    }
}

/// Range store shared by everything that reads or writes session ranges
#[derive(Debug, Default)]
pub struct RangeStore {
    state: RwLock<StoreState>,
}

impl RangeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch a session with arbitrary fields, creating it if needed.
    /// Returns true when the patched session is the active one.
    pub fn update(&self, id: &str, patch: RangePatch) -> bool {
        debug!(session = id, ?patch, "Patching session ranges");
        self.state.write().patch(id, patch)
    }

    /// Replace the view range of a session.
    /// Returns true when the session is the active one.
    pub fn update_view_range(&self, id: &str, range: TimelineRange) -> bool {
        self.update(
            id,
            RangePatch {
                view_range: Some(range),
                ..Default::default()
            },
        )
    }

    /// Replace the selection range of a session.
    /// Returns true when the session is the active one.
    pub fn update_selection_range(&self, id: &str, range: TimelineRange) -> bool {
        self.update(
            id,
            RangePatch {
                selection_range: Some(range),
                ..Default::default()
            },
        )
    }

    /// Record the absolute bounds reported for a session.
    /// Returns true when the session is the active one.
    pub fn update_absolute_range(&self, session: &SessionSnapshot) -> bool {
        self.update(
            &session.id,
            RangePatch {
                absolute_range: Some(TimelineRange::new(
                    session.absolute_start,
                    session.absolute_end,
                )),
                ..Default::default()
            },
        )
    }

    /// Point the active marker at a session, or clear it with `None`.
    /// An unknown id gets an empty record so the marker never dangles.
    pub fn set_active(&self, id: Option<&str>) {
        let mut state = self.state.write();
        match id {
            Some(id) => {
                if !state.records.contains_key(id) {
                    state
                        .records
                        .insert(id.to_string(), SessionRangeRecord::empty(id));
                }
                state.active = Some(id.to_string());
            }
            None => state.active = None,
        }
        debug!(active = ?state.active, "Active session changed");
    }

    pub fn get(&self, id: &str) -> Option<SessionRangeRecord> {
        self.state.read().records.get(id).cloned()
    }

    /// The active record, fetched fresh by id
    pub fn active(&self) -> Option<SessionRangeRecord> {
        let state = self.state.read();
        state
            .active
            .as_deref()
            .and_then(|id| state.records.get(id))
            .cloned()
    }

    pub fn active_id(&self) -> Option<String> {
        self.state.read().active.clone()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.state.read().active.as_deref() == Some(id)
    }

    /// Remove a session, clearing the active marker if it pointed there
    pub fn delete(&self, session: impl Into<SessionRef>) -> Option<SessionRangeRecord> {
        let session = session.into();
        let removed = self.state.write().remove(session.id());
        match &removed {
            Some(_) => debug!(session = session.id(), "Removed session ranges"),
            None => warn!(session = session.id(), "Tried to remove an untracked session"),
        }
        removed
    }

    /// Drop every record and the active marker
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.records.clear();
        state.active = None;
    }

    /// Replace the whole contents, as when reloading a saved workspace
    pub fn restore(&self, records: Vec<SessionRangeRecord>, active: Option<SessionRangeRecord>) {
        let mut state = self.state.write();
        state.records.clear();
        state.active = None;
        for record in records {
            let id = record.id.clone();
            state.patch(&id, record.as_patch());
        }
        if let Some(active) = active {
            if !state.records.contains_key(&active.id) {
                state.records.insert(active.id.clone(), active.clone());
            }
            state.active = Some(active.id);
        }
        debug!(
            sessions = state.records.len(),
            active = ?state.active,
            "Restored session ranges"
        );
    }

    /// Snapshot of the contents in insertion order
    pub fn snapshot(&self) -> PersistedRanges {
        let state = self.state.read();
        PersistedRanges {
            records: state.records.values().cloned().collect(),
            active: state
                .active
                .as_deref()
                .and_then(|id| state.records.get(id))
                .cloned(),
        }
    }

    pub fn restore_persisted(&self, persisted: PersistedRanges) {
        self.restore(persisted.records, persisted.active);
    }

    /// Records in insertion order
    pub fn records(&self) -> Vec<SessionRangeRecord> {
        self.state.read().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }
}

/// Serde helper writing timestamps as decimal strings
mod timestamp_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::range::Timestamp;

    pub fn serialize<S: Serializer>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.trim().parse().map_err(D::Error::custom)
    }
}
