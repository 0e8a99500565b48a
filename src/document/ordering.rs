//! Extracts comment entries from a document in a trustworthy order
//!
//! Comment nodes usually arrive sorted by id, except that the remote appends
//! protected comments at the end with ids far below the main run. A single
//! global sort would interleave the two blocks; instead the sequence is split
//! at the first id regression and each run is sorted on its own.

use crate::document::parser::CommentDocument;
use crate::model::{CommentEntry, ContentId};

/// Builds typed entries from a document of content `id` and orders them
///
/// Nodes with a missing or malformed `p` attribute are skipped with a
/// warning naming the content id.
pub fn extract_ordered(document: &CommentDocument, id: ContentId) -> Vec<CommentEntry> {
    let entries = document.nodes.iter().filter_map(|node| {
        let Some(attributes) = node.attributes.as_deref() else {
            tracing::warn!("At content id {} skipping comment node without attributes", id);
            return None;
        };
        match CommentEntry::from_attributes(attributes, node.text.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("At content id {} skipping malformed comment node: {}", id, e);
                None
            }
        }
    });

    order_entries(entries)
}

/// Applies the gap rule to entries given in document order
///
/// Returns the primary run sorted by id followed by the secondary run sorted
/// by id. Without a regression the result is simply the sorted input.
pub fn order_entries(entries: impl IntoIterator<Item = CommentEntry>) -> Vec<CommentEntry> {
    let mut primary = Vec::new();
    let mut secondary = Vec::new();
    let mut last_seen_id = i64::MIN;
    let mut gap_found = false;

    for entry in entries {
        if !gap_found {
            if entry.id < last_seen_id {
                gap_found = true;
            } else {
                last_seen_id = entry.id;
            }
        }

        if gap_found {
            secondary.push(entry);
        } else {
            primary.push(entry);
        }
    }

    primary.sort_by_key(|entry| entry.id);
    secondary.sort_by_key(|entry| entry.id);
    primary.extend(secondary);
    primary
}
