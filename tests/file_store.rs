use std::{fs, path::Path, sync::Arc, time::Duration};

use serde_json::json;
use tempfile::TempDir;
use webnotes::{
    validate_tags, Backend, Config, FileStore, FlushPolicy, NewNote, NotePatch, NoteStore,
    TagCount, MAX_TAGS_PER_NOTE,
};

async fn open(dir: &Path) -> FileStore {
    let store = FileStore::new(&Config::with_data_dir(dir));
    store.init().await.expect("init file store");
    store
}

fn titled(title: &str) -> NewNote {
    NewNote {
        title: Some(title.into()),
        ..Default::default()
    }
}

fn tagged(title: &str, tags: &[&str]) -> NewNote {
    NewNote {
        title: Some(title.into()),
        tags: Some(tags.iter().map(|t| t.to_string()).collect()),
        ..Default::default()
    }
}

fn content(text: &str) -> NotePatch {
    NotePatch {
        content: Some(text.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn create_then_get_returns_same_record() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;

    let created = store
        .create_note(NewNote {
            title: Some("Test Note".into()),
            content: Some("Test content".into()),
            language: Some("javascript".into()),
            pinned: Some(true),
            tags: Some(vec!["work".into(), "urgent".into()]),
        })
        .await
        .unwrap();

    assert_eq!(created.id, 1);
    let fetched = store.get_note(created.id).await.unwrap().unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.tags, vec!["work", "urgent"]);
    assert!(fetched.pinned);
}

#[tokio::test]
async fn missing_ids_are_absent_not_errors() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;

    assert!(store.get_note(999).await.unwrap().is_none());
    assert!(store.update_note(999, content("x")).await.unwrap().is_none());
    assert!(!store.delete_note(999).await.unwrap());
    assert!(store.get_versions(999).await.unwrap().is_empty());
}

#[tokio::test]
async fn partial_update_keeps_other_fields_and_refreshes_timestamp() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;
    let note = store
        .create_note(NewNote {
            title: Some("Original".into()),
            content: Some("Old".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let updated = store
        .update_note(
            note.id,
            NotePatch {
                title: Some("Updated".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.title, "Updated");
    assert_eq!(updated.content, "Old");
    assert_eq!(updated.created_at, note.created_at);
    assert!(updated.updated_at > note.updated_at);
}

#[tokio::test]
async fn content_change_records_previous_body_only() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;
    let note = store
        .create_note(NewNote {
            title: Some("N".into()),
            content: Some("v0".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    store.update_note(note.id, content("v1")).await.unwrap();
    let versions = store.get_versions(note.id).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].content, "v0");
    assert_eq!(versions[0].title, "N");

    // Same content, title/pin/tag edits: no new snapshot.
    store.update_note(note.id, content("v1")).await.unwrap();
    store
        .update_note(
            note.id,
            NotePatch {
                title: Some("Renamed".into()),
                pinned: Some(true),
                tags: Some(vec!["t".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(store.get_versions(note.id).await.unwrap().len(), 1);

    store.update_note(note.id, content("v2")).await.unwrap();
    let contents: Vec<String> = store
        .get_versions(note.id)
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.content)
        .collect();
    assert_eq!(contents, vec!["v0", "v1"]);

    assert!(store.delete_note(note.id).await.unwrap());
    assert!(store.get_note(note.id).await.unwrap().is_none());
    assert!(store.get_versions(note.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn only_twenty_most_recent_versions_are_kept() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;
    let note = store
        .create_note(NewNote {
            content: Some("v0".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    for i in 1..=25 {
        store
            .update_note(note.id, content(&format!("v{i}")))
            .await
            .unwrap();
    }

    let versions = store.get_versions(note.id).await.unwrap();
    assert_eq!(versions.len(), 20);
    let expected: Vec<String> = (5..=24).map(|i| format!("v{i}")).collect();
    let actual: Vec<String> = versions.into_iter().map(|v| v.content).collect();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn listing_orders_pinned_first_then_recent() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;

    store.create_note(titled("First")).await.unwrap();
    let pinned = store
        .create_note(NewNote {
            title: Some("Pinned".into()),
            pinned: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    store.create_note(titled("Second")).await.unwrap();
    store.create_note(titled("Third")).await.unwrap();

    let titles: Vec<String> = store
        .list_notes(None, None)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, vec!["Pinned", "Third", "Second", "First"]);

    // Unpinning drops it behind every pinned note, but it is now the most recent.
    store
        .update_note(
            pinned.id,
            NotePatch {
                pinned: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let first = store.list_notes(None, None).await.unwrap().remove(0);
    assert_eq!(first.title, "Pinned");
}

#[tokio::test]
async fn search_matches_all_terms_in_title_or_content() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;

    store
        .create_note(NewNote {
            title: Some("JavaScript Guide".into()),
            content: Some("Learn JS".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .create_note(NewNote {
            title: Some("Tutorial".into()),
            content: Some("Python and javascript content".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let both = store.list_notes(Some("javascript"), None).await.unwrap();
    assert_eq!(both.len(), 2);

    let one = store
        .list_notes(Some("JAVASCRIPT python"), None)
        .await
        .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].title, "Tutorial");

    assert!(store
        .list_notes(Some("javascript rust"), None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn tag_filter_and_untagged_filter() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;

    store.create_note(tagged("Work Note", &["work"])).await.unwrap();
    store
        .create_note(tagged("Personal Note", &["personal"]))
        .await
        .unwrap();
    store.create_note(tagged("Untagged", &[])).await.unwrap();

    let work = store.list_notes(None, Some("work")).await.unwrap();
    assert_eq!(work.len(), 1);
    assert_eq!(work[0].title, "Work Note");

    let untagged = store.list_notes(None, Some("")).await.unwrap();
    assert_eq!(untagged.len(), 1);
    assert_eq!(untagged[0].title, "Untagged");

    let combined = store
        .list_notes(Some("note"), Some("personal"))
        .await
        .unwrap();
    assert_eq!(combined.len(), 1);
}

#[tokio::test]
async fn tag_aggregate_rename_and_delete() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;

    store
        .create_note(tagged("a", &["work", "urgent"]))
        .await
        .unwrap();
    store.create_note(tagged("b", &["work"])).await.unwrap();
    store.create_note(tagged("c", &["personal"])).await.unwrap();
    store.create_note(tagged("d", &[])).await.unwrap();

    assert_eq!(
        store.list_tags().await.unwrap(),
        vec![
            TagCount { tag: "personal".into(), count: 1 },
            TagCount { tag: "urgent".into(), count: 1 },
            TagCount { tag: "work".into(), count: 2 },
        ]
    );

    assert_eq!(store.rename_tag("work", "job").await.unwrap(), 2);
    assert_eq!(store.list_notes(None, Some("job")).await.unwrap().len(), 2);
    assert!(store.list_notes(None, Some("work")).await.unwrap().is_empty());

    assert_eq!(store.delete_tag("urgent").await.unwrap(), 1);
    assert_eq!(store.delete_tag("urgent").await.unwrap(), 0);
    let tags: Vec<String> = store
        .list_tags()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.tag)
        .collect();
    assert_eq!(tags, vec!["job", "personal"]);
}

#[tokio::test]
async fn rename_into_existing_tag_does_not_duplicate() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;
    let note = store.create_note(tagged("n", &["a", "b"])).await.unwrap();

    assert_eq!(store.rename_tag("a", "b").await.unwrap(), 1);
    let tags = store.get_note(note.id).await.unwrap().unwrap().tags;
    assert_eq!(tags, vec!["b"]);
    assert!(store.get_versions(note.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_operations_skip_unknown_ids() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;

    let a = store.create_note(titled("Note 1")).await.unwrap();
    let b = store.create_note(tagged("Note 2", &["x"])).await.unwrap();
    let keep = store.create_note(titled("Keep")).await.unwrap();

    assert_eq!(store.bulk_tag(&[a.id, b.id, 404], "x").await.unwrap(), 2);
    let tagged_notes = store.list_notes(None, Some("x")).await.unwrap();
    assert_eq!(tagged_notes.len(), 2);
    assert_eq!(store.get_note(b.id).await.unwrap().unwrap().tags, vec!["x"]);

    store.update_note(a.id, content("changed")).await.unwrap();
    assert_eq!(store.bulk_delete(&[a.id, b.id, 404]).await.unwrap(), 2);

    let remaining = store.list_notes(None, None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep.id);
    assert!(store.get_versions(a.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn reload_reproduces_notes_counter_and_versions() {
    let dir = TempDir::new().unwrap();

    let (notes, versions, deleted) = {
        let store = open(dir.path()).await;
        let a = store.create_note(tagged("a", &["t"])).await.unwrap();
        let b = store.create_note(titled("b")).await.unwrap();
        store.update_note(a.id, content("one")).await.unwrap();
        store.update_note(a.id, content("two")).await.unwrap();
        store.delete_note(b.id).await.unwrap();
        (
            store.list_notes(None, None).await.unwrap(),
            store.get_versions(a.id).await.unwrap(),
            b.id,
        )
    };

    let store = open(dir.path()).await;
    assert_eq!(store.list_notes(None, None).await.unwrap(), notes);
    assert_eq!(store.get_versions(notes[0].id).await.unwrap(), versions);

    // The counter survived: the deleted id is not handed out again.
    let next = store.create_note(titled("c")).await.unwrap();
    assert!(next.id > deleted);
}

#[tokio::test]
async fn persisted_layout_matches_document_format() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;
    let note = store.create_note(titled("a")).await.unwrap();
    store.update_note(note.id, content("new")).await.unwrap();

    let raw = fs::read_to_string(dir.path().join("notes.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["nextId"], 2);
    assert_eq!(value["notes"][0]["title"], "a");
    assert_eq!(value["notes"][0]["pinned"], false);
    assert_eq!(value["versions"]["1"][0]["content"], "");
}

#[tokio::test]
async fn legacy_document_is_upgraded_and_written_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.json");
    let legacy = json!({
        "notes": [
            {"id": 1, "title": "Old", "content": "body", "language": "rust",
             "created_at": "2024-01-01T00:00:00.000Z",
             "updated_at": "2024-01-01T00:00:00.000Z",
             "category": "archive"}
        ],
        "nextId": 2
    });
    fs::write(&path, legacy.to_string()).unwrap();

    let store = open(dir.path()).await;
    let note = store.get_note(1).await.unwrap().unwrap();
    assert_eq!(note.tags, vec!["archive"]);
    assert!(!note.pinned);

    let rewritten: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(rewritten["notes"][0].get("category").is_none());
    assert_eq!(rewritten["notes"][0]["tags"], json!(["archive"]));
    assert!(rewritten["versions"].is_object());
}

#[tokio::test]
async fn corrupt_document_starts_fresh() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.json"), "not json at all").unwrap();

    let store = open(dir.path()).await;
    assert!(store.list_notes(None, None).await.unwrap().is_empty());
    let note = store.create_note(titled("fresh")).await.unwrap();
    assert_eq!(note.id, 1);
}

#[tokio::test]
async fn reset_clears_everything() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;
    let note = store.create_note(titled("gone")).await.unwrap();
    store.update_note(note.id, content("x")).await.unwrap();

    store.reset().await.unwrap();
    assert!(store.list_notes(None, None).await.unwrap().is_empty());
    assert!(store.get_versions(note.id).await.unwrap().is_empty());
    assert_eq!(store.create_note(titled("again")).await.unwrap().id, 1);
}

#[tokio::test]
async fn health_reports_file_backend() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;

    let health = store.health_check().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.db, Backend::File);
    assert_eq!(
        serde_json::to_value(&health).unwrap(),
        json!({"status": "ok", "db": "file"})
    );
}

#[tokio::test]
async fn debounced_writes_are_visible_immediately_and_flushed_later() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.json");
    let store = FileStore::with_policy(
        path.clone(),
        FlushPolicy::Debounced(Duration::from_millis(50)),
    );
    store.init().await.unwrap();
    assert!(store.flush_status().unwrap().is_running);

    for i in 0..10 {
        store.create_note(titled(&format!("n{i}"))).await.unwrap();
    }
    // Memory is authoritative for reads regardless of the flush.
    assert_eq!(store.list_notes(None, None).await.unwrap().len(), 10);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["notes"].as_array().unwrap().len(), 10);

    store.create_note(titled("last")).await.unwrap();
    store.close().await.unwrap();
    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["nextId"], 12);
}

#[tokio::test]
async fn concurrent_mutations_do_not_lose_updates() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(dir.path()).await);
    let id = store.create_note(titled("shared")).await.unwrap().id;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.bulk_tag(&[id], &format!("t{i}")).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let tags = store.get_note(id).await.unwrap().unwrap().tags;
    assert_eq!(tags.len(), 16);
}

#[tokio::test]
async fn delete_tag_refreshes_touched_notes_without_versions() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;
    let tagged_note = store.create_note(tagged("a", &["drop", "keep"])).await.unwrap();
    let other = store.create_note(tagged("b", &["keep"])).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(store.delete_tag("drop").await.unwrap(), 1);

    let after = store.get_note(tagged_note.id).await.unwrap().unwrap();
    assert_eq!(after.tags, vec!["keep"]);
    assert!(after.updated_at > tagged_note.updated_at);
    assert_eq!(
        store.get_note(other.id).await.unwrap().unwrap().updated_at,
        other.updated_at
    );
    assert!(store.get_versions(tagged_note.id).await.unwrap().is_empty());
    assert!(store.get_versions(other.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_tag_refreshes_only_notes_that_gain_the_tag() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;
    let already = store.create_note(tagged("a", &["x"])).await.unwrap();
    let fresh = store.create_note(tagged("b", &[])).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(store.bulk_tag(&[already.id, fresh.id], "x").await.unwrap(), 2);

    let already_after = store.get_note(already.id).await.unwrap().unwrap();
    let fresh_after = store.get_note(fresh.id).await.unwrap().unwrap();
    assert_eq!(already_after.updated_at, already.updated_at);
    assert!(fresh_after.updated_at > fresh.updated_at);
    assert_eq!(fresh_after.tags, vec!["x"]);
    assert!(store.get_versions(already.id).await.unwrap().is_empty());
    assert!(store.get_versions(fresh.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_tag_never_exceeds_the_tag_limit() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path()).await;
    let full: Vec<String> = (0..MAX_TAGS_PER_NOTE).map(|i| format!("t{i}")).collect();
    let crowded = store
        .create_note(NewNote {
            tags: Some(full.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(store.bulk_tag(&[crowded.id], "extra").await.unwrap(), 0);

    let after = store.get_note(crowded.id).await.unwrap().unwrap();
    assert_eq!(after.tags, full);
    assert!(validate_tags(&after.tags).is_ok());
    assert_eq!(after.updated_at, crowded.updated_at);
}

#[tokio::test(flavor = "current_thread")]
async fn writes_and_reads_interleave_on_a_single_threaded_runtime() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(dir.path()).await);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let writer = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            writer.create_note(titled(&format!("n{i}"))).await.unwrap();
        }));
        let reader = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            reader.list_notes(None, None).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.list_notes(None, None).await.unwrap().len(), 8);
    let on_disk: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("notes.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(on_disk["notes"].as_array().unwrap().len(), 8);
    assert_eq!(on_disk["nextId"], 9);
}
