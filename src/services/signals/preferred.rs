use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;

use crate::models::{Post, RecommendationItem, RecommendationType};
use crate::store::{collections, DocumentStore, OrderBy, StoreError};

use super::{SignalContext, SignalSource};

/// Number of top preference types actually queried; the weighting below still
/// ranks against the full preference list.
const QUERY_TYPE_COUNT: usize = 3;

/// Recent posts whose business type matches the user's ranked preferences,
/// weighted by preference rank.
pub struct PreferredSignal {
    store: Arc<dyn DocumentStore>,
}

impl PreferredSignal {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SignalSource for PreferredSignal {
    fn signal(&self) -> RecommendationType {
        RecommendationType::Preferred
    }

    async fn retrieve(
        &self,
        ctx: &SignalContext<'_>,
        quota: usize,
        excluded: &HashSet<String>,
        _rng: &mut (dyn RngCore + Send),
    ) -> Result<Vec<RecommendationItem>, StoreError> {
        if ctx.preferred_types.is_empty() || quota == 0 {
            return Ok(Vec::new());
        }

        let top_types: Vec<String> = ctx
            .preferred_types
            .iter()
            .take(QUERY_TYPE_COUNT)
            .cloned()
            .collect();
        let docs = self
            .store
            .query_by_field_in(
                collections::POSTS,
                "businessType",
                &top_types,
                Some(OrderBy::desc("createdAt")),
                Some(quota * 3),
            )
            .await?;

        let mut weighted: Vec<(Post, f64)> = Vec::new();
        for post in docs.iter().filter_map(Post::from_doc) {
            if excluded.contains(&post.id) || post.uid == ctx.user_id {
                continue;
            }
            // Rank against the full preference list; a type absent from it
            // keeps the post with weight zero rather than dropping it.
            let weight = post
                .business_type
                .as_deref()
                .and_then(|bt| ctx.preferred_types.iter().position(|t| t == bt))
                .map(|rank| 1.0 / (rank as f64 + 1.0))
                .unwrap_or(0.0);
            weighted.push((post, weight));
        }

        weighted.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.0.epoch_seconds().total_cmp(&a.0.epoch_seconds()))
        });

        Ok(weighted
            .into_iter()
            .take(quota)
            .map(|(post, _)| RecommendationItem::new(post, RecommendationType::Preferred))
            .collect())
    }
}
