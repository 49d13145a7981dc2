//! Keyed batch fetching. The store caps key-in-set queries at
//! [`MAX_IN_KEYS`](super::MAX_IN_KEYS) keys, so larger id sets are split into
//! chunks, fetched concurrently and merged by id. The merge is a plain
//! key-to-record union, so chunk completion order does not matter.

use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;

use super::{collections, Document, DocumentStore, StoreError, MAX_IN_KEYS};

/// Fetch `ids` from `collection` in bounded chunks, merging into an
/// id-to-document map. Ids with no matching record are silently omitted.
pub async fn fetch_map(
    store: &dyn DocumentStore,
    collection: &str,
    ids: &[String],
) -> Result<HashMap<String, Document>, StoreError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let fetches = ids
        .chunks(MAX_IN_KEYS)
        .map(|chunk| store.get_by_ids(collection, chunk));
    let batches = try_join_all(fetches).await?;

    let mut map = HashMap::with_capacity(ids.len());
    for doc in batches.into_iter().flatten() {
        map.insert(doc.id.clone(), doc);
    }
    Ok(map)
}

/// Which of `uids` authored at least one post. Used as the activity probe by
/// the entity scorer.
pub async fn posts_exist_for(
    store: &dyn DocumentStore,
    uids: &[String],
) -> Result<HashSet<String>, StoreError> {
    if uids.is_empty() {
        return Ok(HashSet::new());
    }

    let probes = uids
        .chunks(MAX_IN_KEYS)
        .map(|chunk| store.query_by_field_in(collections::POSTS, "uid", chunk, None, None));
    let batches = try_join_all(probes).await?;

    let mut active = HashSet::new();
    for doc in batches.into_iter().flatten() {
        if let Some(uid) = doc.str_field("uid") {
            active.insert(uid.to_string());
        }
    }
    Ok(active)
}
