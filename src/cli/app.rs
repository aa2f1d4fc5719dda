//! CLI application handler.
//!
//! Each command is validated with the boundary rules, then forwarded to the store.
use std::{fs::read_to_string, path::PathBuf, sync::Arc};

use log::debug;
use serde::Serialize;

use crate::{
    normalize_tag_name, parse_tags, validate_bulk_ids, validate_new_note, validate_patch,
    validate_tag, Commands, NewNote, Note, NotePatch, NoteStore, NotesError, Result, TagCount,
    Version,
};

/// CLI Application handler - processes CLI commands and interfaces with the store
pub struct App {
    /// The storage backend chosen at startup
    store: Arc<dyn NoteStore>,

    /// Print JSON instead of text
    json: bool,
}

impl App {
    /// Create a new CLI application over the given store
    pub fn new(store: Arc<dyn NoteStore>, json: bool) -> Self {
        Self { store, json }
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Create {
                title,
                content,
                file,
                language,
                tags,
                pinned,
            } => {
                let input = NewNote {
                    title,
                    content: read_content(content, file)?,
                    language,
                    pinned: Some(pinned),
                    tags: tags.map(|t| parse_tags(Some(t))),
                };
                validate_new_note(&input)?;

                let note = self.store.create_note(input).await?;
                self.show_note(&note)?;
            }

            Commands::Get { id } => match self.store.get_note(id).await? {
                Some(note) => self.show_note(&note)?,
                None => not_found(id),
            },

            Commands::List { query, tag } => {
                let notes = self
                    .store
                    .list_notes(query.as_deref(), tag.as_deref())
                    .await?;
                self.show_notes(&notes)?;
            }

            Commands::Update {
                id,
                title,
                content,
                file,
                language,
                tags,
                pinned,
            } => {
                let patch = NotePatch {
                    title,
                    content: read_content(content, file)?,
                    language,
                    pinned,
                    tags: tags.map(|t| parse_tags(Some(t))),
                };
                validate_patch(&patch)?;

                match self.store.update_note(id, patch).await? {
                    Some(note) => self.show_note(&note)?,
                    None => not_found(id),
                }
            }

            Commands::Delete { id } => {
                if self.store.delete_note(id).await? {
                    println!("Deleted note {}", id);
                } else {
                    not_found(id);
                }
            }

            Commands::Tags => {
                let tags = self.store.list_tags().await?;
                self.show_tags(&tags)?;
            }

            Commands::RenameTag { old_name, new_name } => {
                let new_name = normalize_tag_name(&new_name)?;
                let count = self.store.rename_tag(&old_name, &new_name).await?;
                self.show_count("updated", count)?;
            }

            Commands::DeleteTag { name } => {
                let count = self.store.delete_tag(&name).await?;
                self.show_count("updated", count)?;
            }

            Commands::BulkDelete { ids } => {
                validate_bulk_ids(&ids)?;
                let count = self.store.bulk_delete(&ids).await?;
                self.show_count("deleted", count)?;
            }

            Commands::BulkTag { tag, ids } => {
                validate_bulk_ids(&ids)?;
                validate_tag(&tag)?;
                let count = self.store.bulk_tag(&ids, &tag).await?;
                self.show_count("tagged", count)?;
            }

            Commands::Versions { id } => {
                let versions = self.store.get_versions(id).await?;
                self.show_versions(&versions)?;
            }

            Commands::Health => {
                let health = self.store.health_check().await?;
                self.print_json(&health)?;
            }
        }

        Ok(())
    }

    fn show_note(&self, note: &Note) -> Result<()> {
        if self.json {
            return self.print_json(note);
        }

        println!("ID: {} | Language: {}{}", note.id, note.language, pin_marker(note));
        println!("Title: {}", note.title);
        if !note.tags.is_empty() {
            println!("Tags: {}", note.tags.join(", "));
        }
        println!(
            "Created: {} | Updated: {}",
            note.created_at.format("%Y-%m-%d %H:%M"),
            note.updated_at.format("%Y-%m-%d %H:%M")
        );
        println!();
        println!("{}", note.content);
        Ok(())
    }

    fn show_notes(&self, notes: &[Note]) -> Result<()> {
        if self.json {
            return self.print_json(notes);
        }

        if notes.is_empty() {
            println!("No notes found matching the criteria.");
            return Ok(());
        }

        for note in notes {
            let tags = if note.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", note.tags.join(", "))
            };
            println!("{:>5}{} {}{}", note.id, pin_marker(note), note.title, tags);
        }

        println!(
            "\nFound {} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }

    fn show_tags(&self, tags: &[TagCount]) -> Result<()> {
        if self.json {
            return self.print_json(tags);
        }
        for tag in tags {
            println!("{:>5}  {}", tag.count, tag.tag);
        }
        Ok(())
    }

    fn show_versions(&self, versions: &[Version]) -> Result<()> {
        if self.json {
            return self.print_json(versions);
        }
        if versions.is_empty() {
            println!("No versions recorded.");
        }
        for (i, version) in versions.iter().enumerate() {
            println!(
                "#{} saved {} | {} ({} bytes)",
                i + 1,
                version.saved_at.format("%Y-%m-%d %H:%M:%S"),
                version.title,
                version.content.len()
            );
        }
        Ok(())
    }

    fn show_count(&self, label: &str, count: usize) -> Result<()> {
        if self.json {
            return self.print_json(&serde_json::json!({ label: count }));
        }
        println!("{}: {}", label, count);
        Ok(())
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Content comes from the flag or from a file, never both.
fn read_content(content: Option<String>, file: Option<PathBuf>) -> Result<Option<String>> {
    match (content, file) {
        (Some(c), _) => Ok(Some(c)),
        (None, Some(path)) => {
            debug!("Reading content from {}", path.display());
            read_to_string(&path).map(Some).map_err(|e| {
                NotesError::validation("content", format!("cannot read {}: {}", path.display(), e))
            })
        }
        (None, None) => Ok(None),
    }
}

fn pin_marker(note: &Note) -> &'static str {
    if note.pinned {
        " *"
    } else {
        ""
    }
}

fn not_found(id: i64) {
    eprintln!("Note {} not found", id);
}
