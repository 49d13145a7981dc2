//! Per-request view of the requesting user: profile document, followed
//! accounts and the frequency-ranked business-type preferences every signal
//! shares.

use crate::error::{AppError, Result};
use crate::models::User;
use crate::store::{batch, collections, DocumentStore, StoreError};

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user: User,
    pub following: Vec<String>,
    /// Business types ranked by occurrence across declared preferences and
    /// followed accounts, most frequent first.
    pub preferred_types: Vec<String>,
}

pub async fn load_profile(store: &dyn DocumentStore, user_id: &str) -> Result<UserProfile> {
    let doc = store
        .get_by_id(collections::USERS, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;
    let user = User::from_doc(&doc)
        .ok_or_else(|| AppError::Internal(format!("malformed user document {user_id}")))?;

    let following: Vec<String> = store
        .list(&collections::following(user_id), None, None)
        .await?
        .into_iter()
        .map(|doc| doc.id)
        .collect();

    let mut tags = user.business_preferences.clone();
    let followed = batch::fetch_map(store, collections::USERS, &following).await?;
    for id in &following {
        if let Some(business_type) = followed.get(id).and_then(|doc| doc.str_field("businessType"))
        {
            tags.push(business_type.to_string());
        }
    }

    Ok(UserProfile {
        user,
        following,
        preferred_types: rank_by_frequency(tags),
    })
}

/// Business types of the posts the user has liked.
pub async fn load_liked_types(
    store: &dyn DocumentStore,
    user_id: &str,
) -> std::result::Result<Vec<String>, StoreError> {
    Ok(store
        .list(&collections::likes(user_id), None, None)
        .await?
        .into_iter()
        .filter_map(|doc| doc.str_field("businessType").map(str::to_string))
        .collect())
}

/// Ranks tags by total occurrence count; ties keep first-seen order, so the
/// ranking is stable across identical inputs.
pub fn rank_by_frequency(tags: Vec<String>) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for tag in tags {
        match counts.iter_mut().find(|(seen, _)| *seen == tag) {
            Some((_, count)) => *count += 1,
            None => counts.push((tag, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(tag, _)| tag).collect()
}
