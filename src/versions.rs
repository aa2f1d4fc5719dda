//! Bounded per-note history of prior bodies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Note, NoteId, Version};

/// Snapshots retained per note; older ones are evicted first.
pub const MAX_VERSIONS_PER_NOTE: usize = 20;

/// Version histories keyed by note id, oldest snapshot first in each list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionStore {
    histories: BTreeMap<NoteId, Vec<Version>>,
}

impl VersionStore {
    /// Snapshots `current` if `incoming_content` differs from what it stores.
    /// Returns whether a snapshot was taken.
    pub fn record_if_changed(
        &mut self,
        current: &Note,
        incoming_content: &str,
        saved_at: DateTime<Utc>,
    ) -> bool {
        if current.content == incoming_content {
            return false;
        }
        self.push(current.id, current.snapshot(saved_at));
        true
    }

    /// Appends a snapshot and trims the history to [`MAX_VERSIONS_PER_NOTE`].
    pub fn push(&mut self, id: NoteId, version: Version) {
        let history = self.histories.entry(id).or_default();
        history.push(version);
        if history.len() > MAX_VERSIONS_PER_NOTE {
            let excess = history.len() - MAX_VERSIONS_PER_NOTE;
            history.drain(..excess);
        }
    }

    pub fn list(&self, id: NoteId) -> Vec<Version> {
        self.histories.get(&id).cloned().unwrap_or_default()
    }

    /// Removes the whole history of a note. Returns whether there was one.
    pub fn drop_all(&mut self, id: NoteId) -> bool {
        self.histories.remove(&id).is_some()
    }

    /// Drops histories whose note no longer exists. Returns how many were dropped.
    pub fn retain_notes(&mut self, keep: impl Fn(NoteId) -> bool) -> usize {
        let before = self.histories.len();
        self.histories.retain(|id, history| keep(*id) && !history.is_empty());
        before - self.histories.len()
    }

    /// Trims histories loaded from disk that exceed the cap.
    pub fn enforce_cap(&mut self) -> bool {
        let mut trimmed = false;
        for history in self.histories.values_mut() {
            if history.len() > MAX_VERSIONS_PER_NOTE {
                let excess = history.len() - MAX_VERSIONS_PER_NOTE;
                history.drain(..excess);
                trimmed = true;
            }
        }
        trimmed
    }

    pub fn note_count(&self) -> usize {
        self.histories.len()
    }
}
