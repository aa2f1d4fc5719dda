//! Boundary checks applied before input reaches a store.
//!
//! Stores assume their input already passed these rules and do not re-check them.

use std::collections::HashSet;

use crate::{NewNote, NoteId, NotePatch, NotesError, Result};

pub const MAX_TITLE_CHARS: usize = 255;
pub const MAX_LANGUAGE_CHARS: usize = 50;
pub const MAX_CONTENT_BYTES: usize = 1024 * 1024;
pub const MAX_TAGS_PER_NOTE: usize = 20;
pub const MAX_TAG_CHARS: usize = 100;

pub fn validate_new_note(input: &NewNote) -> Result<()> {
    check_fields(
        input.title.as_deref(),
        input.content.as_deref(),
        input.language.as_deref(),
        input.tags.as_deref(),
    )
}

pub fn validate_patch(patch: &NotePatch) -> Result<()> {
    check_fields(
        patch.title.as_deref(),
        patch.content.as_deref(),
        patch.language.as_deref(),
        patch.tags.as_deref(),
    )
}

fn check_fields(
    title: Option<&str>,
    content: Option<&str>,
    language: Option<&str>,
    tags: Option<&[String]>,
) -> Result<()> {
    if let Some(title) = title {
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(NotesError::validation(
                "title",
                format!("too long (max {})", MAX_TITLE_CHARS),
            ));
        }
    }

    if let Some(content) = content {
        if content.len() > MAX_CONTENT_BYTES {
            return Err(NotesError::validation("content", "too large (max 1MB)"));
        }
    }

    if let Some(language) = language {
        if language.chars().count() > MAX_LANGUAGE_CHARS {
            return Err(NotesError::validation(
                "language",
                format!("too long (max {})", MAX_LANGUAGE_CHARS),
            ));
        }
    }

    if let Some(tags) = tags {
        validate_tags(tags)?;
    }

    Ok(())
}

/// Checks a whole tag set: size, per-tag rules, and uniqueness.
pub fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.len() > MAX_TAGS_PER_NOTE {
        return Err(NotesError::validation(
            "tags",
            format!("too many tags (max {})", MAX_TAGS_PER_NOTE),
        ));
    }

    let mut seen = HashSet::with_capacity(tags.len());
    for tag in tags {
        validate_tag(tag)?;
        if !seen.insert(tag.as_str()) {
            return Err(NotesError::validation(
                "tags",
                format!("duplicate tag '{}'", tag),
            ));
        }
    }

    Ok(())
}

/// Checks a single tag string.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.trim().is_empty() {
        return Err(NotesError::validation("tags", "tags must be non-empty"));
    }
    if tag.trim() != tag {
        return Err(NotesError::validation(
            "tags",
            "tags must not have leading or trailing whitespace",
        ));
    }
    if tag.chars().count() > MAX_TAG_CHARS {
        return Err(NotesError::validation(
            "tags",
            format!("tag too long (max {})", MAX_TAG_CHARS),
        ));
    }
    Ok(())
}

/// Checks the id list of a bulk request.
pub fn validate_bulk_ids(ids: &[NoteId]) -> Result<()> {
    if ids.is_empty() {
        return Err(NotesError::validation("ids", "must be a non-empty array"));
    }
    if let Some(bad) = ids.iter().find(|id| **id <= 0) {
        return Err(NotesError::validation(
            "ids",
            format!("invalid id {}", bad),
        ));
    }
    Ok(())
}

/// Trims a new tag name for a rename and checks what is left.
pub fn normalize_tag_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NotesError::validation("newName", "must be non-empty"));
    }
    if trimmed.chars().count() > MAX_TAG_CHARS {
        return Err(NotesError::validation(
            "newName",
            format!("too long (max {})", MAX_TAG_CHARS),
        ));
    }
    Ok(trimmed.to_string())
}
