//! PostgreSQL backend.
//!
//! Notes live in `notes` with a generated, weighted `tsvector` for search; snapshots
//! live in `note_versions` and disappear with their note through the foreign key.
//! Every mutation is a single statement or one short transaction.

use std::time::Instant;

use async_trait::async_trait;
use log::{debug, info};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::{
    dedup_tags, search_terms, Backend, DatabaseConfig, HealthStatus, NewNote, Note, NoteId,
    NotePatch, NoteStore, Result, TagCount, Version, MAX_TAGS_PER_NOTE, MAX_VERSIONS_PER_NOTE,
};

/// Column list for reading notes. Tables created by older releases use a 32-bit id.
const NOTE_COLUMNS: &str =
    "id::BIGINT AS id, title, content, language, pinned, tags, created_at, updated_at";

/// Schema statements, run in order inside one transaction by `init`.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS notes (
      id BIGSERIAL PRIMARY KEY,
      title VARCHAR(255) NOT NULL DEFAULT 'Untitled',
      content TEXT NOT NULL DEFAULT '',
      language VARCHAR(50) NOT NULL DEFAULT 'plaintext',
      pinned BOOLEAN NOT NULL DEFAULT FALSE,
      tags TEXT[] NOT NULL DEFAULT '{}',
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "ALTER TABLE notes ADD COLUMN IF NOT EXISTS pinned BOOLEAN NOT NULL DEFAULT FALSE",
    "ALTER TABLE notes ADD COLUMN IF NOT EXISTS tags TEXT[] NOT NULL DEFAULT '{}'",
    r#"
    DO $$ BEGIN
      IF NOT EXISTS (
        SELECT 1 FROM information_schema.columns
        WHERE table_schema = current_schema()
          AND table_name = 'notes' AND column_name = 'search_vector'
      ) THEN
        ALTER TABLE notes ADD COLUMN search_vector tsvector
          GENERATED ALWAYS AS (
            setweight(to_tsvector('english', coalesce(title, '')), 'A') ||
            setweight(to_tsvector('english', coalesce(content, '')), 'B')
          ) STORED;
      END IF;
    END $$
    "#,
    "CREATE INDEX IF NOT EXISTS idx_notes_search ON notes USING GIN (search_vector)",
    "CREATE INDEX IF NOT EXISTS idx_notes_tags ON notes USING GIN (tags)",
    r#"
    DO $$ BEGIN
      IF EXISTS (
        SELECT 1 FROM information_schema.columns
        WHERE table_schema = current_schema()
          AND table_name = 'notes' AND column_name = 'category'
      ) THEN
        UPDATE notes
           SET tags = array_append(tags, btrim(category))
         WHERE category IS NOT NULL
           AND btrim(category) <> ''
           AND NOT (btrim(category) = ANY(tags));
        ALTER TABLE notes DROP COLUMN category;
      END IF;
    END $$
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS note_versions (
      id BIGSERIAL PRIMARY KEY,
      note_id BIGINT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
      title VARCHAR(255) NOT NULL,
      content TEXT NOT NULL,
      language VARCHAR(50) NOT NULL,
      saved_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_note_versions_note ON note_versions (note_id, saved_at)",
];

/// Relational backend over a PostgreSQL pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects using the configured settings. Fails fast when the server is
    /// unreachable so the caller can fall back to file storage.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::connect_with(config.connect_options()?, config).await
    }

    pub async fn connect_with(options: PgConnectOptions, config: &DatabaseConfig) -> Result<Self> {
        let start = Instant::now();
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await?;

        info!(
            "Connected to PostgreSQL in {} ms (max_connections={})",
            start.elapsed().as_millis(),
            config.max_connections
        );
        Ok(Self { pool })
    }
}

/// Turns free text into a prefix `tsquery` requiring every term, e.g.
/// `"rust own"` becomes `rust:* & own:*`. Returns `None` when nothing searchable is
/// left.
pub fn prefix_tsquery(query: &str) -> Option<String> {
    let terms: Vec<String> = search_terms(query)
        .into_iter()
        .map(|t| t.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|t| !t.is_empty())
        .map(|t| format!("{}:*", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" & "))
    }
}

#[async_trait]
impl NoteStore for PgStore {
    async fn init(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notes")
            .fetch_one(&self.pool)
            .await?;
        info!("PostgreSQL storage ready ({} notes)", count);
        Ok(())
    }

    async fn create_note(&self, input: NewNote) -> Result<Note> {
        let draft = Note::new(0, input);
        let note: Note = sqlx::query_as(&format!(
            "INSERT INTO notes (title, content, language, pinned, tags)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {NOTE_COLUMNS}"
        ))
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(&draft.language)
        .bind(draft.pinned)
        .bind(&draft.tags)
        .fetch_one(&self.pool)
        .await?;

        info!("Created note {}", note.id);
        Ok(note)
    }

    async fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        let note = sqlx::query_as(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(note)
    }

    async fn list_notes(&self, query: Option<&str>, tag: Option<&str>) -> Result<Vec<Note>> {
        let tsquery = query.and_then(prefix_tsquery);

        let notes: Vec<Note> = sqlx::query_as(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE ($1::TEXT IS NULL
                    OR ($1 = '' AND cardinality(tags) = 0)
                    OR ($1 <> '' AND $1 = ANY(tags)))
               AND ($2::TEXT IS NULL OR search_vector @@ to_tsquery('english', $2))
             ORDER BY pinned DESC,
                      CASE WHEN $2::TEXT IS NULL THEN 0
                           ELSE ts_rank(search_vector, to_tsquery('english', $2)) END DESC,
                      updated_at DESC,
                      id DESC"
        ))
        .bind(tag)
        .bind(tsquery.as_deref())
        .fetch_all(&self.pool)
        .await?;

        debug!("Listed {} notes (query={:?}, tag={:?})", notes.len(), query, tag);
        Ok(notes)
    }

    async fn update_note(&self, id: NoteId, patch: NotePatch) -> Result<Option<Note>> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Note> = sqlx::query_as(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            debug!("Update of missing note {}", id);
            return Ok(None);
        };

        if patch.content.as_deref().is_some_and(|c| c != current.content) {
            sqlx::query(
                "INSERT INTO note_versions (note_id, title, content, language, saved_at)
                 VALUES ($1, $2, $3, $4, NOW())",
            )
            .bind(id)
            .bind(&current.title)
            .bind(&current.content)
            .bind(&current.language)
            .execute(&mut *tx)
            .await?;

            let evicted = sqlx::query(
                "DELETE FROM note_versions
                 WHERE note_id = $1
                   AND id NOT IN (
                     SELECT id FROM note_versions
                     WHERE note_id = $1
                     ORDER BY saved_at DESC, id DESC
                     LIMIT $2)",
            )
            .bind(id)
            .bind(MAX_VERSIONS_PER_NOTE as i64)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if evicted > 0 {
                debug!("Evicted {} old versions of note {}", evicted, id);
            }
        }

        let tags = patch.tags.map(dedup_tags);
        let note: Note = sqlx::query_as(&format!(
            "UPDATE notes
                SET title = COALESCE($2, title),
                    content = COALESCE($3, content),
                    language = COALESCE($4, language),
                    pinned = COALESCE($5, pinned),
                    tags = COALESCE($6, tags),
                    updated_at = NOW()
              WHERE id = $1
          RETURNING {NOTE_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.title)
        .bind(patch.content)
        .bind(patch.language)
        .bind(patch.pinned)
        .bind(tags)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Updated note {}", id);
        Ok(Some(note))
    }

    async fn delete_note(&self, id: NoteId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;

        if deleted {
            info!("Deleted note {}", id);
        }
        Ok(deleted)
    }

    async fn list_tags(&self) -> Result<Vec<TagCount>> {
        let tags = sqlx::query_as(
            r#"SELECT tag, COUNT(*)::BIGINT AS count
               FROM notes, unnest(tags) AS tag
               GROUP BY tag
               ORDER BY tag COLLATE "C""#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    async fn rename_tag(&self, old_name: &str, new_name: &str) -> Result<usize> {
        if old_name == new_name {
            return Ok(0);
        }

        let count = sqlx::query(
            "UPDATE notes
                SET tags = CASE WHEN $2 = ANY(tags) THEN array_remove(tags, $1)
                                ELSE array_replace(tags, $1, $2) END,
                    updated_at = NOW()
              WHERE $1 = ANY(tags)",
        )
        .bind(old_name)
        .bind(new_name)
        .execute(&self.pool)
        .await?
        .rows_affected();

        info!("Renamed tag '{}' to '{}' on {} notes", old_name, new_name, count);
        Ok(count as usize)
    }

    async fn delete_tag(&self, name: &str) -> Result<usize> {
        let count = sqlx::query(
            "UPDATE notes
                SET tags = array_remove(tags, $1), updated_at = NOW()
              WHERE $1 = ANY(tags)",
        )
        .bind(name)
        .execute(&self.pool)
        .await?
        .rows_affected();

        info!("Removed tag '{}' from {} notes", name, count);
        Ok(count as usize)
    }

    async fn bulk_delete(&self, ids: &[NoteId]) -> Result<usize> {
        let count = sqlx::query("DELETE FROM notes WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?
            .rows_affected();

        info!("Bulk deleted {} of {} notes", count, ids.len());
        Ok(count as usize)
    }

    async fn bulk_tag(&self, ids: &[NoteId], tag: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "WITH hit AS (
               SELECT id, tags FROM notes WHERE id = ANY($1) FOR UPDATE
             ), tagged AS (
               UPDATE notes
                  SET tags = array_append(tags, $2), updated_at = NOW()
                WHERE id IN (SELECT id FROM hit)
                  AND NOT ($2 = ANY(tags))
                  AND cardinality(tags) < $3
               RETURNING id
             )
             SELECT COUNT(*) FROM hit
              WHERE $2 = ANY(tags) OR cardinality(tags) < $3",
        )
        .bind(ids)
        .bind(tag)
        .bind(MAX_TAGS_PER_NOTE as i32)
        .fetch_one(&self.pool)
        .await?;

        info!("Bulk tagged {} notes with '{}'", count, tag);
        Ok(count as usize)
    }

    async fn get_versions(&self, id: NoteId) -> Result<Vec<Version>> {
        let versions = sqlx::query_as(
            "SELECT title, content, language, saved_at
               FROM note_versions
              WHERE note_id = $1
              ORDER BY saved_at ASC, id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(versions)
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(HealthStatus::ok(Backend::Postgres))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
        Ok(())
    }
}
