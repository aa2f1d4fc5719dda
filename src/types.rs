//! Shared input/output types for the webnotes store.
//!
//! This module contains the request shapes passed into a [`NoteStore`](crate::NoteStore),
//! the aggregate shapes it returns, and the CLI subcommands.
use std::path::PathBuf;

use clap::Subcommand;
use serde::{Deserialize, Serialize};

use crate::NotesError;

/// A specialized Result type for webnotes operations.
pub type Result<T> = std::result::Result<T, NotesError>;

/// Identifier of a note. Positive, assigned by the store.
pub type NoteId = i64;

/// Fields accepted when creating a note. Missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub language: Option<String>,
    pub pinned: Option<bool>,
    pub tags: Option<Vec<String>>,
}

/// A partial update. Only the fields that are `Some` are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub language: Option<String>,
    pub pinned: Option<bool>,
    pub tags: Option<Vec<String>>,
}


/// One row of the tag aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// Which storage engine backs a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    File,
    Postgres,
}

/// Liveness report returned by `health_check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub db: Backend,
}

impl HealthStatus {
    pub fn ok(db: Backend) -> Self {
        HealthStatus {
            status: "ok".to_string(),
            db,
        }
    }
}

/// Available subcommands for the webnotes application
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    Create {
        /// Title of the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// Content of the note
        #[clap(short, long)]
        content: Option<String>,

        /// Path to a file containing the note's content
        #[clap(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,

        /// Language label used for highlighting
        #[clap(short, long)]
        language: Option<String>,

        /// Tags to associate with the note (comma-separated)
        #[clap(short = 't', long)]
        tags: Option<String>,

        /// Pin the note
        #[clap(short, long)]
        pinned: bool,
    },

    /// View a note by ID
    Get {
        /// ID of the note to view
        id: i64,
    },

    /// List notes, optionally searching and filtering by tag
    List {
        /// Search terms, all of which must match
        #[clap(short, long)]
        query: Option<String>,

        /// Only notes carrying this tag; pass an empty string for untagged notes
        #[clap(short, long)]
        tag: Option<String>,
    },

    /// Update fields of an existing note
    Update {
        /// ID of the note to edit
        id: i64,

        /// New title for the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// New content for the note
        #[clap(short, long)]
        content: Option<String>,

        /// Path to a file containing the new note content
        #[clap(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,

        /// New language label
        #[clap(short, long)]
        language: Option<String>,

        /// Replace the tag set (comma-separated)
        #[clap(short = 't', long)]
        tags: Option<String>,

        /// Set or clear the pin
        #[clap(short, long)]
        pinned: Option<bool>,
    },

    /// Delete a note by ID
    Delete {
        /// ID of the note to delete
        id: i64,
    },

    /// List all tags with their note counts
    Tags,

    /// Rename a tag across every note
    RenameTag {
        /// Current tag name
        old_name: String,
        /// New tag name
        new_name: String,
    },

    /// Remove a tag from every note
    DeleteTag {
        /// Tag to remove
        name: String,
    },

    /// Delete several notes at once
    BulkDelete {
        /// IDs of the notes to delete
        #[clap(required = true)]
        ids: Vec<i64>,
    },

    /// Add a tag to several notes at once
    BulkTag {
        /// Tag to add
        #[clap(short = 't', long)]
        tag: String,

        /// IDs of the notes to tag
        #[clap(required = true)]
        ids: Vec<i64>,
    },

    /// Show the retained version history of a note
    Versions {
        /// ID of the note
        id: i64,
    },

    /// Report store liveness
    Health,
}
