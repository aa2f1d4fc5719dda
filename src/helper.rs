use std::{cmp::Ordering, collections::BTreeMap, collections::HashSet};

use crate::{Note, TagCount};

/// Removes repeated tags, keeping the first occurrence of each.
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(tags.len());
    tags.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

// Helper method for parsing tags
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Splits a free-text query into lowercase terms. Whitespace-only queries yield none.
pub fn search_terms(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

/// Case-insensitive AND match of every term against title and content.
pub fn matches_terms(note: &Note, terms: &[String]) -> bool {
    let haystack = format!("{} {}", note.title, note.content).to_lowercase();
    terms.iter().all(|t| haystack.contains(t.as_str()))
}

/// Exact tag membership; the empty filter selects untagged notes.
pub fn matches_tag_filter(note: &Note, tag: &str) -> bool {
    if tag.is_empty() {
        note.tags.is_empty()
    } else {
        note.has_tag(tag)
    }
}

/// Default listing order: pinned first, then most recently updated, then newest id.
pub fn listing_order(a: &Note, b: &Note) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| b.id.cmp(&a.id))
}

/// Counts tag occurrences over a note collection, sorted by tag.
pub fn count_tags<'a>(notes: impl IntoIterator<Item = &'a Note>) -> Vec<TagCount> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for note in notes {
        for tag in &note.tags {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect()
}

/// Replaces `old` with `new` in a tag list without creating a duplicate.
/// Returns whether the list changed.
pub fn rename_tag_in(tags: &mut Vec<String>, old: &str, new: &str) -> bool {
    let Some(pos) = tags.iter().position(|t| t == old) else {
        return false;
    };

    if tags.iter().any(|t| t == new) {
        tags.remove(pos);
    } else {
        tags[pos] = new.to_string();
    }
    true
}

/// Removes `tag` from a tag list. Returns whether it was present.
pub fn remove_tag_from(tags: &mut Vec<String>, tag: &str) -> bool {
    let before = tags.len();
    tags.retain(|t| t != tag);
    tags.len() != before
}
