//! Core data structures for the webnotes store.
//!
//! This module contains the records both backends hand out: notes and the version
//! snapshots kept for them.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{dedup_tags, NewNote, NoteId};

/// Title given to notes created without one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Language label given to notes created without one.
pub const DEFAULT_LANGUAGE: &str = "plaintext";

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Note {
    /// Unique identifier, assigned by the store and never reused
    pub id: NoteId,
    /// Note title
    pub title: String,
    /// Note body
    pub content: String,
    /// Display/highlighting label, opaque to the store
    pub language: String,
    /// Pinned notes sort before everything else
    pub pinned: bool,
    /// Tags for organization, unique within the note
    pub tags: Vec<String>,
    /// When the note was created
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Creates a new note from creation input, applying defaults.
    pub fn new(id: NoteId, input: NewNote) -> Self {
        let now = Utc::now();

        Note {
            id,
            title: non_empty_or(input.title, DEFAULT_TITLE),
            content: input.content.unwrap_or_default(),
            language: non_empty_or(input.language, DEFAULT_LANGUAGE),
            pinned: input.pinned.unwrap_or(false),
            tags: dedup_tags(input.tags.unwrap_or_default()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the note carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Snapshot of the current body, stamped with the time it was superseded.
    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> Version {
        Version {
            title: self.title.clone(),
            content: self.content.clone(),
            language: self.language.clone(),
            saved_at,
        }
    }
}

/// An immutable prior body of a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Version {
    pub title: String,
    pub content: String,
    pub language: String,
    /// Time of the save that replaced this body
    pub saved_at: DateTime<Utc>,
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}
