use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;

use crate::models::{Post, RecommendationItem, RecommendationType};
use crate::store::{collections, DocumentStore, OrderBy, StoreError, MAX_IN_KEYS};

use super::{newest_first, SignalContext, SignalSource};

/// Posts from accounts the user follows, newest first.
pub struct FollowedSignal {
    store: Arc<dyn DocumentStore>,
}

impl FollowedSignal {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SignalSource for FollowedSignal {
    fn signal(&self) -> RecommendationType {
        RecommendationType::Followed
    }

    async fn retrieve(
        &self,
        ctx: &SignalContext<'_>,
        quota: usize,
        _excluded: &HashSet<String>,
        _rng: &mut (dyn RngCore + Send),
    ) -> Result<Vec<RecommendationItem>, StoreError> {
        if ctx.following.is_empty() || quota == 0 {
            return Ok(Vec::new());
        }

        // Over-fetch so self-posts can be dropped without starving the quota.
        let fetch = quota * 2;
        let mut items: Vec<RecommendationItem> = Vec::new();
        for chunk in ctx.following.chunks(MAX_IN_KEYS) {
            let docs = self
                .store
                .query_by_field_in(
                    collections::POSTS,
                    "uid",
                    chunk,
                    Some(OrderBy::desc("createdAt")),
                    Some(fetch),
                )
                .await?;
            items.extend(
                docs.iter()
                    .filter_map(Post::from_doc)
                    .map(|post| RecommendationItem::new(post, RecommendationType::Followed)),
            );
        }

        items.sort_by(newest_first);
        items.truncate(fetch);
        items.retain(|item| item.post.uid != ctx.user_id);
        items.truncate(quota);
        Ok(items)
    }
}
