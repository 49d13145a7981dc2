use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::RngCore;

use crate::models::{Post, RecommendationItem, RecommendationType};
use crate::store::{collections, DocumentStore, OrderBy, StoreError};

use super::{SignalContext, SignalSource};

/// How many of the top preferred types are held back from the random pool so
/// the fallback signal adds variety instead of more of the same.
const OVERREPRESENTED_TYPE_COUNT: usize = 2;

/// Fallback signal: a uniform sample of recent posts outside the types the
/// other signals already lean on.
pub struct RandomSignal {
    store: Arc<dyn DocumentStore>,
}

impl RandomSignal {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SignalSource for RandomSignal {
    fn signal(&self) -> RecommendationType {
        RecommendationType::Random
    }

    async fn retrieve(
        &self,
        ctx: &SignalContext<'_>,
        quota: usize,
        excluded: &HashSet<String>,
        rng: &mut (dyn RngCore + Send),
    ) -> Result<Vec<RecommendationItem>, StoreError> {
        if quota == 0 {
            return Ok(Vec::new());
        }

        let docs = self
            .store
            .list(collections::POSTS, Some(OrderBy::desc("createdAt")), Some(quota * 4))
            .await?;

        let exclude_types: Vec<&str> = ctx
            .preferred_types
            .iter()
            .take(OVERREPRESENTED_TYPE_COUNT)
            .map(String::as_str)
            .collect();

        let mut posts: Vec<Post> = docs
            .iter()
            .filter_map(Post::from_doc)
            .filter(|post| {
                !excluded.contains(&post.id)
                    && post.uid != ctx.user_id
                    && post
                        .business_type
                        .as_deref()
                        .map(|bt| !exclude_types.contains(&bt))
                        .unwrap_or(true)
            })
            .collect();

        posts.shuffle(rng);
        Ok(posts
            .into_iter()
            .take(quota)
            .map(|post| RecommendationItem::new(post, RecommendationType::Random))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    #[tokio::test]
    async fn filters_self_excluded_and_overrepresented_types() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(collections::POSTS, "own", json!({"uid": "alice", "createdAt": {"seconds": 5.0}}))
            .await;
        store
            .insert(collections::POSTS, "seen", json!({"uid": "b1", "createdAt": {"seconds": 4.0}}))
            .await;
        store
            .insert(
                collections::POSTS,
                "cafe_post",
                json!({"uid": "b2", "businessType": "cafe", "createdAt": {"seconds": 3.0}}),
            )
            .await;
        store
            .insert(
                collections::POSTS,
                "gym_post",
                json!({"uid": "b3", "businessType": "gym", "createdAt": {"seconds": 2.0}}),
            )
            .await;

        let signal = RandomSignal::new(store);
        let preferred: Vec<String> = vec!["cafe".into(), "salon".into(), "gym".into()];
        let ctx = SignalContext {
            user_id: "alice",
            following: &[],
            preferred_types: &preferred,
            location: None,
            now: Utc::now(),
        };
        let excluded: HashSet<String> = ["seen".to_string()].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(7);
        let items = signal.retrieve(&ctx, 10, &excluded, &mut rng).await.unwrap();

        // Only the gym post survives: "cafe" is over-represented (top 2),
        // "gym" ranked third is not.
        let ids: Vec<&str> = items.iter().map(|i| i.post.id.as_str()).collect();
        assert_eq!(ids, vec!["gym_post"]);
    }

    #[tokio::test]
    async fn shuffle_is_deterministic_under_a_seeded_rng() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..12 {
            store
                .insert(
                    collections::POSTS,
                    &format!("p{i}"),
                    json!({"uid": format!("b{i}"), "createdAt": {"seconds": i as f64}}),
                )
                .await;
        }

        let signal = RandomSignal::new(store);
        let ctx = SignalContext {
            user_id: "alice",
            following: &[],
            preferred_types: &[],
            location: None,
            now: Utc::now(),
        };

        let mut rng_a = StdRng::seed_from_u64(42);
        let a = signal.retrieve(&ctx, 5, &HashSet::new(), &mut rng_a).await.unwrap();
        let mut rng_b = StdRng::seed_from_u64(42);
        let b = signal.retrieve(&ctx, 5, &HashSet::new(), &mut rng_b).await.unwrap();

        let ids_a: Vec<&str> = a.iter().map(|i| i.post.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|i| i.post.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(ids_a.len(), 5);
    }
}
