use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::{
    dedup_tags, Backend, Config, Document, FlushPolicy, FlushScheduler, FlushSchedulerStatus,
    HealthStatus, NewNote, Note, NoteId, NotePatch, NoteStore, NotesError, Result, TagCount,
    Version, VersionStore, DEFAULT_LANGUAGE, DEFAULT_TITLE,
};

/// JSON-file backend. The whole store lives in memory and is mirrored to one
/// document on disk, replaced atomically on every write.
pub struct FileStore {
    /// State shared with the background flush task
    shared: Arc<Shared>,

    /// When mutations reach disk
    policy: FlushPolicy,

    /// Present only for [`FlushPolicy::Debounced`] once initialized
    scheduler: Mutex<Option<FlushScheduler>>,

    /// Flag indicating if the document has been loaded
    initialized: AtomicBool,
}

/// In-memory document plus the bookkeeping needed to write it safely.
pub(crate) struct Shared {
    path: PathBuf,
    state: Mutex<State>,
    /// Generation of the last document written to disk
    written: Mutex<u64>,
}

struct State {
    doc: Document,
    /// Bumped on every committed mutation
    generation: u64,
}

impl FileStore {
    /// Creates a store for the configured data directory. Nothing is read until
    /// [`NoteStore::init`] runs.
    pub fn new(config: &Config) -> Self {
        Self::with_policy(config.notes_file(), config.flush_policy())
    }

    pub fn with_policy(path: PathBuf, policy: FlushPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                path,
                state: Mutex::new(State {
                    doc: Document::default(),
                    generation: 0,
                }),
                written: Mutex::new(0),
            }),
            policy,
            scheduler: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Path of the JSON document.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Writes pending in-memory state to disk now.
    pub async fn flush(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.flush())
            .await
            .map_err(|e| NotesError::FlushFailed {
                message: e.to_string(),
            })?
    }

    /// Wipes every note, version and the id counter, as a freshly created store.
    pub async fn reset(&self) -> Result<()> {
        info!("Resetting file store at {}", self.shared.path.display());
        self.mutate(|doc| {
            *doc = Document::default();
            ((), true)
        })
        .await
    }

    /// Status of the background flush task, if one is running.
    pub fn flush_status(&self) -> Option<FlushSchedulerStatus> {
        self.scheduler
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(FlushScheduler::get_status))
    }

    /// Runs one read-modify-write under the state lock.
    ///
    /// `edit` returns its result and whether it changed the document. In immediate
    /// mode the whole step, disk write included, runs on the blocking pool and the
    /// edit is applied to a copy that replaces the live document only after it is on
    /// disk, so a failed write leaves the previous state in place.
    async fn mutate<T, F>(&self, edit: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Document) -> (T, bool) + Send + 'static,
    {
        match self.policy {
            FlushPolicy::Immediate => {
                let shared = Arc::clone(&self.shared);
                tokio::task::spawn_blocking(move || shared.commit(edit))
                    .await
                    .map_err(|e| NotesError::FlushFailed {
                        message: format!("write task failed: {}", e),
                    })?
            }
            FlushPolicy::Debounced(_) => {
                let (value, changed) = self.shared.edit_in_place(edit)?;
                if changed {
                    self.mark_dirty();
                }
                Ok(value)
            }
        }
    }

    fn read<T>(&self, view: impl FnOnce(&Document) -> T) -> Result<T> {
        let state = self.shared.lock_state()?;
        Ok(view(&state.doc))
    }

    fn mark_dirty(&self) {
        match self.scheduler.lock() {
            Ok(guard) => {
                if let Some(scheduler) = guard.as_ref() {
                    scheduler.mark_dirty();
                }
            }
            Err(e) => warn!("Failed to acquire scheduler lock: {}", e),
        }
    }

    fn start_scheduler(&self) {
        let FlushPolicy::Debounced(window) = self.policy else {
            return;
        };

        match self.scheduler.lock() {
            Ok(mut guard) => {
                let scheduler = guard.get_or_insert_with(|| FlushScheduler::new(window));
                scheduler.start(Arc::downgrade(&self.shared));
            }
            Err(e) => error!("Failed to acquire scheduler lock: {}", e),
        }
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let FlushPolicy::Debounced(_) = self.policy {
            if let Err(e) = self.shared.flush() {
                error!("Failed to flush notes document on drop: {}", e);
            }
        }
    }
}

impl Shared {
    fn lock_state(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| NotesError::LockPoisoned {
            message: "Failed to acquire lock on notes document".to_string(),
        })
    }

    /// Applies `edit` to a copy, writes the copy, then installs it. Blocks on disk I/O.
    fn commit<T>(&self, edit: impl FnOnce(&mut Document) -> (T, bool)) -> Result<T> {
        let mut state = self.lock_state()?;

        let mut next = state.doc.clone();
        let (value, changed) = edit(&mut next);
        if !changed {
            return Ok(value);
        }

        let generation = state.generation + 1;
        let json = serde_json::to_string_pretty(&next)?;
        self.write(&json, generation)?;

        state.doc = next;
        state.generation = generation;
        Ok(value)
    }

    /// Applies `edit` to the live document, leaving the write to the flush task.
    /// Returns the edit's result and whether it changed anything.
    fn edit_in_place<T>(&self, edit: impl FnOnce(&mut Document) -> (T, bool)) -> Result<(T, bool)> {
        let mut state = self.lock_state()?;
        let (value, changed) = edit(&mut state.doc);
        if changed {
            state.generation += 1;
        }
        Ok((value, changed))
    }

    /// Writes the current document if it is newer than what is on disk.
    pub(crate) fn flush(&self) -> Result<()> {
        let (json, generation) = {
            let state = self.lock_state()?;
            (serde_json::to_string_pretty(&state.doc)?, state.generation)
        };
        self.write(&json, generation)
    }

    /// Atomically replaces the document on disk, unless a newer generation is
    /// already there.
    fn write(&self, json: &str, generation: u64) -> Result<()> {
        let mut written = self.written.lock().map_err(|_| NotesError::LockPoisoned {
            message: "Failed to acquire lock on document writer".to_string(),
        })?;

        if generation <= *written && self.path.exists() {
            trace!("Document generation {} already on disk", generation);
            return Ok(());
        }

        write_document(&self.path, json)?;
        *written = generation;
        debug!("Wrote document generation {} to {}", generation, self.path.display());
        Ok(())
    }

    /// Replaces the live document. `on_disk` records that the file already holds it.
    fn install(&self, doc: Document, on_disk: bool) -> Result<()> {
        let mut state = self.lock_state()?;
        state.doc = doc;
        state.generation += 1;

        if on_disk {
            let mut written = self.written.lock().map_err(|_| NotesError::LockPoisoned {
                message: "Failed to acquire lock on document writer".to_string(),
            })?;
            *written = state.generation;
        }
        Ok(())
    }
}

/// Saves a serialized document using temp-file-then-rename so a crash never leaves a
/// half-written file behind.
pub fn write_document(path: &Path, json: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    trace!("Creating temporary file in directory: {}", dir.display());
    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
        error!("Failed to create temporary file: {}", e);
        NotesError::Io(e)
    })?;

    temp_file.write_all(json.as_bytes()).map_err(|e| {
        error!("Failed to write to temporary file: {}", e);
        NotesError::Io(e)
    })?;

    temp_file.flush()?;
    temp_file.as_file().sync_all().map_err(|e| {
        error!("Failed to sync temporary file: {}", e);
        NotesError::Io(e)
    })?;

    temp_file.persist(path).map_err(|e| {
        error!("Failed to persist file {}: {}", path.display(), e.error);
        NotesError::Io(e.error)
    })?;

    Ok(())
}

/// Outcome of reading the document from disk.
#[derive(Debug)]
pub struct LoadedDocument {
    pub document: Document,
    /// The stored form was older or inconsistent and must be written back
    pub migrated: bool,
}

/// Reads `notes.json`, upgrading legacy layouts. A missing file is an empty store; an
/// unparseable one is discarded with a warning.
pub fn load_document(path: &Path) -> Result<LoadedDocument> {
    if !path.exists() {
        debug!("No document at {}, starting empty", path.display());
        return Ok(LoadedDocument {
            document: Document::default(),
            migrated: false,
        });
    }

    let raw = fs::read_to_string(path).map_err(|e| {
        error!("Failed to open document {}: {}", path.display(), e);
        NotesError::Io(e)
    })?;

    match serde_json::from_str::<StoredDocument>(&raw) {
        Ok(stored) => Ok(upgrade(stored, Utc::now())),
        Err(e) => {
            warn!("Corrupted data file {}, starting fresh: {}", path.display(), e);
            Ok(LoadedDocument {
                document: Document::default(),
                migrated: false,
            })
        }
    }
}

/// Document layout accepted on load, including fields from earlier versions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDocument {
    #[serde(default)]
    notes: Vec<StoredNote>,
    #[serde(default)]
    next_id: Option<NoteId>,
    #[serde(default)]
    versions: Option<VersionStore>,
}

#[derive(Debug, Deserialize)]
struct StoredNote {
    id: NoteId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    pinned: Option<bool>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    /// Single-label field from before tags existed
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

fn upgrade(stored: StoredDocument, now: DateTime<Utc>) -> LoadedDocument {
    let mut migrated = stored.versions.is_none();

    let mut notes = Vec::with_capacity(stored.notes.len());
    for raw in stored.notes {
        let (note, upgraded) = upgrade_note(raw, now);
        migrated |= upgraded;
        notes.push(note);
    }

    let floor = notes.iter().map(|n| n.id).max().unwrap_or(0) + 1;
    let next_id = stored.next_id.unwrap_or(1).max(floor);
    migrated |= stored.next_id != Some(next_id);

    let mut versions = stored.versions.unwrap_or_default();
    let orphans = versions.retain_notes(|id| notes.iter().any(|n| n.id == id));
    if orphans > 0 {
        warn!("Dropped {} version histories without a note", orphans);
    }
    migrated |= orphans > 0;
    migrated |= versions.enforce_cap();

    if migrated {
        info!("Document uses an older layout and will be upgraded");
    }

    LoadedDocument {
        document: Document {
            notes,
            next_id,
            versions,
        },
        migrated,
    }
}

fn upgrade_note(raw: StoredNote, now: DateTime<Utc>) -> (Note, bool) {
    let mut migrated = raw.title.is_none()
        || raw.content.is_none()
        || raw.language.is_none()
        || raw.pinned.is_none()
        || raw.tags.is_none()
        || raw.category.is_some()
        || raw.created_at.is_none()
        || raw.updated_at.is_none();

    let mut tags = raw.tags.unwrap_or_default();
    if let Some(category) = raw.category {
        let category = category.trim();
        if !category.is_empty() {
            tags.push(category.to_string());
        }
    }
    let before = tags.len();
    let tags = dedup_tags(tags);
    migrated |= tags.len() != before;

    let created_at = raw.created_at.or(raw.updated_at).unwrap_or(now);
    let note = Note {
        id: raw.id,
        title: raw.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        content: raw.content.unwrap_or_default(),
        language: raw.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        pinned: raw.pinned.unwrap_or(false),
        tags,
        created_at,
        updated_at: raw.updated_at.unwrap_or(created_at),
    };

    (note, migrated)
}

#[async_trait]
impl NoteStore for FileStore {
    async fn init(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        let path = self.shared.path.clone();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                debug!("Data directory does not exist, creating: {}", dir.display());
                fs::create_dir_all(dir).map_err(|e| {
                    error!("Failed to create data directory: {}", e);
                    NotesError::DirectoryError {
                        path: dir.to_path_buf(),
                    }
                })?;
            }
        }

        let existed = path.exists();
        let loaded = load_document(&path)?;
        let notes_count = loaded.document.notes.len();
        self.shared
            .install(loaded.document, existed && !loaded.migrated)?;

        if loaded.migrated {
            self.shared.flush()?;
            info!("Upgraded document written back to {}", path.display());
        }

        self.start_scheduler();
        self.initialized.store(true, Ordering::SeqCst);

        info!("File-based storage: {} ({} notes)", path.display(), notes_count);
        Ok(())
    }

    async fn create_note(&self, input: NewNote) -> Result<Note> {
        let note = self.mutate(move |doc| (doc.create(input), true)).await?;
        info!("Created note {}", note.id);
        Ok(note)
    }

    async fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        self.read(|doc| doc.get(id).cloned())
    }

    async fn list_notes(&self, query: Option<&str>, tag: Option<&str>) -> Result<Vec<Note>> {
        let notes = self.read(|doc| doc.list(query, tag))?;
        debug!("Listed {} notes (query={:?}, tag={:?})", notes.len(), query, tag);
        Ok(notes)
    }

    async fn update_note(&self, id: NoteId, patch: NotePatch) -> Result<Option<Note>> {
        let now = Utc::now();
        let updated = self
            .mutate(move |doc| {
                let updated = doc.update(id, patch, now);
                let changed = updated.is_some();
                (updated, changed)
            })
            .await?;

        match &updated {
            Some(_) => info!("Updated note {}", id),
            None => debug!("Update of missing note {}", id),
        }
        Ok(updated)
    }

    async fn delete_note(&self, id: NoteId) -> Result<bool> {
        let deleted = self
            .mutate(move |doc| {
                let deleted = doc.delete(id);
                (deleted, deleted)
            })
            .await?;

        if deleted {
            info!("Deleted note {}", id);
        }
        Ok(deleted)
    }

    async fn list_tags(&self) -> Result<Vec<TagCount>> {
        self.read(Document::tags)
    }

    async fn rename_tag(&self, old_name: &str, new_name: &str) -> Result<usize> {
        let now = Utc::now();
        let (old, new) = (old_name.to_string(), new_name.to_string());
        let count = self
            .mutate(move |doc| {
                let count = doc.rename_tag(&old, &new, now);
                (count, count > 0)
            })
            .await?;
        info!("Renamed tag '{}' to '{}' on {} notes", old_name, new_name, count);
        Ok(count)
    }

    async fn delete_tag(&self, name: &str) -> Result<usize> {
        let now = Utc::now();
        let tag = name.to_string();
        let count = self
            .mutate(move |doc| {
                let count = doc.delete_tag(&tag, now);
                (count, count > 0)
            })
            .await?;
        info!("Removed tag '{}' from {} notes", name, count);
        Ok(count)
    }

    async fn bulk_delete(&self, ids: &[NoteId]) -> Result<usize> {
        let wanted = ids.to_vec();
        let count = self
            .mutate(move |doc| {
                let count = doc.bulk_delete(&wanted);
                (count, count > 0)
            })
            .await?;
        info!("Bulk deleted {} of {} notes", count, ids.len());
        Ok(count)
    }

    async fn bulk_tag(&self, ids: &[NoteId], tag: &str) -> Result<usize> {
        let now = Utc::now();
        let (wanted, label) = (ids.to_vec(), tag.to_string());
        let count = self
            .mutate(move |doc| doc.bulk_tag(&wanted, &label, now))
            .await?;
        info!("Bulk tagged {} notes with '{}'", count, tag);
        Ok(count)
    }

    async fn get_versions(&self, id: NoteId) -> Result<Vec<Version>> {
        self.read(|doc| doc.versions(id))
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        drop(self.shared.lock_state()?);
        Ok(HealthStatus::ok(Backend::File))
    }

    async fn close(&self) -> Result<()> {
        let scheduler = self
            .scheduler
            .lock()
            .map_err(|_| NotesError::LockPoisoned {
                message: "Failed to acquire scheduler lock".to_string(),
            })?
            .take();

        if let Some(mut scheduler) = scheduler {
            scheduler.stop().await?;
        }

        self.flush().await?;
        info!("File store closed");
        Ok(())
    }
}
