//! Batch-local grouping of entries into requests by correlation key.

use std::collections::HashMap;

use crate::entry::Entry;
use crate::request::Request;

struct Group {
    request_id: String,
    anchor: Option<Request>,
    related: Vec<Entry>,
}

/// Group one batch of entries by request id.
///
/// - Entries without a request id are discarded.
/// - The first HTTP-request entry of a key anchors the group; later ones for
///   the same key are dropped.
/// - A key with no request entry becomes an orphan [`Request`].
/// - Related entries keep their encounter order.
///
/// The result is sorted by timestamp (stable, so ties keep first-seen key order).
pub fn group_by_request(entries: impl IntoIterator<Item = Entry>) -> Vec<Request> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for entry in entries {
        let Some(request_id) = entry.request_id().map(str::to_string) else {
            continue;
        };
        let slot = *index.entry(request_id.clone()).or_insert_with(|| {
            groups.push(Group {
                request_id,
                anchor: None,
                related: Vec::new(),
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];

        match Request::from_entry(entry) {
            Ok(request) if group.anchor.is_none() => group.anchor = Some(request),
            Ok(duplicate) => {
                tracing::debug!(
                    request_id = duplicate.request_id(),
                    "Dropping duplicate request line in batch"
                );
            }
            Err(entry) => group.related.push(entry),
        }
    }

    let mut requests: Vec<Request> = groups
        .into_iter()
        .map(|group| {
            let mut request = group
                .anchor
                .unwrap_or_else(|| Request::new_orphan(group.request_id));
            for entry in group.related {
                request.add_related_log(entry);
            }
            request
        })
        .collect();

    requests.sort_by_key(Request::timestamp);
    requests
}
