//! The file backend's document: notes, the id counter and version histories.
//!
//! Every operation here is synchronous and works on a plain value, so the store can
//! run each read-modify-write as one step under its lock.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    count_tags, dedup_tags, listing_order, matches_tag_filter, matches_terms, remove_tag_from,
    rename_tag_in, search_terms, NewNote, Note, NoteId, NotePatch, TagCount, Version,
    VersionStore, MAX_TAGS_PER_NOTE,
};

/// On-disk layout of `notes.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub notes: Vec<Note>,
    pub next_id: NoteId,
    pub versions: VersionStore,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            notes: Vec::new(),
            next_id: 1,
            versions: VersionStore::default(),
        }
    }
}

impl Document {
    pub fn create(&mut self, input: NewNote) -> Note {
        let note = Note::new(self.next_id, input);
        self.next_id += 1;
        self.notes.push(note.clone());
        note
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn list(&self, query: Option<&str>, tag: Option<&str>) -> Vec<Note> {
        let terms = query.map(search_terms).unwrap_or_default();

        let mut result: Vec<Note> = self
            .notes
            .iter()
            .filter(|n| tag.map_or(true, |t| matches_tag_filter(n, t)))
            .filter(|n| terms.is_empty() || matches_terms(n, &terms))
            .cloned()
            .collect();

        result.sort_by(listing_order);
        result
    }

    /// Applies the fields present in `patch`. A content change snapshots the
    /// pre-update body first.
    pub fn update(&mut self, id: NoteId, patch: NotePatch, now: DateTime<Utc>) -> Option<Note> {
        let note = self.notes.iter_mut().find(|n| n.id == id)?;

        if let Some(content) = &patch.content {
            self.versions.record_if_changed(note, content, now);
        }

        if let Some(title) = patch.title {
            note.title = title;
        }
        if let Some(content) = patch.content {
            note.content = content;
        }
        if let Some(language) = patch.language {
            note.language = language;
        }
        if let Some(pinned) = patch.pinned {
            note.pinned = pinned;
        }
        if let Some(tags) = patch.tags {
            note.tags = dedup_tags(tags);
        }
        note.updated_at = now;

        Some(note.clone())
    }

    /// Removes a note together with its history.
    pub fn delete(&mut self, id: NoteId) -> bool {
        let Some(idx) = self.notes.iter().position(|n| n.id == id) else {
            return false;
        };
        self.notes.remove(idx);
        self.versions.drop_all(id);
        true
    }

    pub fn tags(&self) -> Vec<TagCount> {
        count_tags(&self.notes)
    }

    pub fn rename_tag(&mut self, old: &str, new: &str, now: DateTime<Utc>) -> usize {
        if old == new {
            return 0;
        }
        self.touch_each(now, |note| rename_tag_in(&mut note.tags, old, new))
    }

    pub fn delete_tag(&mut self, tag: &str, now: DateTime<Utc>) -> usize {
        self.touch_each(now, |note| remove_tag_from(&mut note.tags, tag))
    }

    /// Deletes every listed note that exists. Duplicate ids count once.
    pub fn bulk_delete(&mut self, ids: &[NoteId]) -> usize {
        let wanted: HashSet<NoteId> = ids.iter().copied().collect();
        let before = self.notes.len();
        self.notes.retain(|n| !wanted.contains(&n.id));
        for id in &wanted {
            self.versions.drop_all(*id);
        }
        before - self.notes.len()
    }

    /// Adds `tag` to every listed note that exists and has room for it.
    ///
    /// Returns the number of listed notes that carry the tag afterwards, and whether
    /// any note gained it. Notes already holding [`MAX_TAGS_PER_NOTE`] tags are left
    /// alone and not counted.
    pub fn bulk_tag(&mut self, ids: &[NoteId], tag: &str, now: DateTime<Utc>) -> (usize, bool) {
        let wanted: HashSet<NoteId> = ids.iter().copied().collect();
        let mut matched = 0;
        let mut changed = false;

        for note in self.notes.iter_mut().filter(|n| wanted.contains(&n.id)) {
            if note.has_tag(tag) {
                matched += 1;
            } else if note.tags.len() < MAX_TAGS_PER_NOTE {
                note.tags.push(tag.to_string());
                note.updated_at = now;
                matched += 1;
                changed = true;
            }
        }

        (matched, changed)
    }

    pub fn versions(&self, id: NoteId) -> Vec<Version> {
        self.versions.list(id)
    }

    fn touch_each(&mut self, now: DateTime<Utc>, mut edit: impl FnMut(&mut Note) -> bool) -> usize {
        let mut modified = 0;
        for note in &mut self.notes {
            if edit(note) {
                note.updated_at = now;
                modified += 1;
            }
        }
        modified
    }
}
