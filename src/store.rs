//! The operation contract shared by both storage backends, and startup selection
//! between them.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::{
    Config, FileStore, HealthStatus, NewNote, Note, NoteId, NotePatch, PgStore, Result,
    TagCount, Version,
};

/// Storage for notes, their tags and their version history.
///
/// Unknown ids are not errors: lookups return `None`, deletes return `false`, and bulk
/// operations skip them. Inputs are assumed to have passed [`crate::validation`].
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Prepares the directory or schema and upgrades data written by older versions.
    async fn init(&self) -> Result<()>;

    async fn create_note(&self, input: NewNote) -> Result<Note>;

    async fn get_note(&self, id: NoteId) -> Result<Option<Note>>;

    /// Lists notes, pinned first. `query` must match all of its terms; `tag` of `""`
    /// selects untagged notes.
    ///
    /// The file backend matches each term as a case-insensitive substring of title or
    /// content. PostgreSQL matches English word prefixes and ignores punctuation inside
    /// a term, so `c++` searches as `c`, and stopwords never match. For plain
    /// alphanumeric words that begin a word in the note, both backends agree.
    async fn list_notes(&self, query: Option<&str>, tag: Option<&str>) -> Result<Vec<Note>>;

    /// Applies the present fields. A content change records the previous body.
    async fn update_note(&self, id: NoteId, patch: NotePatch) -> Result<Option<Note>>;

    /// Deletes a note and its version history.
    async fn delete_note(&self, id: NoteId) -> Result<bool>;

    /// Tag counts over all notes, sorted by tag.
    async fn list_tags(&self) -> Result<Vec<TagCount>>;

    /// Returns the number of notes modified.
    async fn rename_tag(&self, old_name: &str, new_name: &str) -> Result<usize>;

    /// Returns the number of notes modified.
    async fn delete_tag(&self, name: &str) -> Result<usize>;

    /// Returns the number of notes deleted.
    async fn bulk_delete(&self, ids: &[NoteId]) -> Result<usize>;

    /// Adds `tag` to the listed notes that have room for it. Returns how many listed
    /// notes carry the tag afterwards; unknown ids and full notes are skipped.
    async fn bulk_tag(&self, ids: &[NoteId], tag: &str) -> Result<usize>;

    /// Retained snapshots, oldest first.
    async fn get_versions(&self, id: NoteId) -> Result<Vec<Version>>;

    async fn health_check(&self) -> Result<HealthStatus>;

    /// Makes pending writes durable and releases resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens the configured backend. PostgreSQL is tried when configured; if it cannot be
/// reached the file backend is used instead. The choice is made once, here.
pub async fn open_store(config: &Config) -> Result<Arc<dyn NoteStore>> {
    if let Some(db) = &config.database {
        match PgStore::connect(db).await {
            Ok(store) => match store.init().await {
                Ok(()) => {
                    info!("Using PostgreSQL storage");
                    return Ok(Arc::new(store));
                }
                Err(e) => warn!("PostgreSQL schema setup failed, using file storage: {}", e),
            },
            Err(e) => warn!("PostgreSQL unavailable, using file storage: {}", e),
        }
    }

    let store = FileStore::new(config);
    store.init().await?;
    Ok(Arc::new(store))
}
