use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use rand::RngCore;
use serde_json::json;
use tracing::debug;

use crate::config::NearbyConfig;
use crate::geo::{self, GEOHASH_PRECISION};
use crate::models::{
    Business, PlanTier, Post, RecommendationItem, RecommendationType, User,
};
use crate::store::{batch, collections, DocumentStore, FieldOp, OrderBy, StoreError};

use super::{newest_first, SignalContext, SignalSource};

/// Posts from businesses physically near the user, discovered through the
/// geohash location index and gated by each business's plan radius.
pub struct NearbySignal {
    store: Arc<dyn DocumentStore>,
    config: NearbyConfig,
}

struct NearbyBusiness {
    distance_km: f64,
    plan: PlanTier,
    recent: Vec<RecommendationItem>,
    older: Vec<RecommendationItem>,
}

impl NearbySignal {
    pub fn new(store: Arc<dyn DocumentStore>, config: NearbyConfig) -> Self {
        Self { store, config }
    }

    /// Business ids listed in the user's cell and its 16 candidate neighbors.
    async fn candidate_ids(&self, cell: &str) -> Result<BTreeSet<String>, StoreError> {
        let mut cells = vec![cell.to_string()];
        cells.extend(geo::neighbor_cells(cell));

        let mut ids = BTreeSet::new();
        for cell in &cells {
            if let Some(doc) = self.store.get_by_id(collections::LOCATION_INDEX, cell).await? {
                if let Some(listed) = doc.fields.get("business_ids").and_then(|v| v.as_array()) {
                    ids.extend(listed.iter().filter_map(|v| v.as_str().map(str::to_string)));
                }
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl SignalSource for NearbySignal {
    fn signal(&self) -> RecommendationType {
        RecommendationType::Location
    }

    async fn retrieve(
        &self,
        ctx: &SignalContext<'_>,
        quota: usize,
        excluded: &HashSet<String>,
        _rng: &mut (dyn RngCore + Send),
    ) -> Result<Vec<RecommendationItem>, StoreError> {
        let Some(origin) = ctx.location else {
            return Ok(Vec::new());
        };
        if quota == 0 {
            return Ok(Vec::new());
        }

        let cell = geo::encode_geohash(origin.latitude, origin.longitude, GEOHASH_PRECISION);
        let mut candidate_ids = self.candidate_ids(&cell).await?;
        candidate_ids.remove(ctx.user_id);
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }
        debug!(cell = %cell, candidates = candidate_ids.len(), "location index candidates");

        let ids: Vec<String> = candidate_ids.into_iter().collect();
        let businesses = batch::fetch_map(&*self.store, collections::BUSINESSES, &ids).await?;
        let owners = batch::fetch_map(&*self.store, collections::USERS, &ids).await?;

        let recent_cutoff =
            (ctx.now - Duration::days(self.config.recent_window_days)).timestamp() as f64;

        let mut accepted: Vec<NearbyBusiness> = Vec::new();
        for id in &ids {
            let Some(business) = businesses.get(id).and_then(|doc| Business::from_doc(doc)) else {
                continue;
            };
            let Some(owner) = owners.get(id).and_then(|doc| User::from_doc(doc)) else {
                continue;
            };
            let Some(location) = business.geo() else {
                continue;
            };

            // Distance is always recomputed from raw coordinates; the index
            // only nominated the candidate.
            let distance = geo::haversine_distance_km(
                origin.latitude,
                origin.longitude,
                location.latitude,
                location.longitude,
            );
            if distance > owner.plan.radius_km() {
                continue;
            }

            let docs = self
                .store
                .query_by_field(
                    collections::POSTS,
                    "uid",
                    FieldOp::Eq,
                    json!(id),
                    Some(OrderBy::desc("createdAt")),
                    Some(self.config.per_business_fetch),
                )
                .await?;

            let author = owner.author_summary();
            let mut recent = Vec::new();
            let mut older = Vec::new();
            for post in docs.iter().filter_map(Post::from_doc) {
                if excluded.contains(&post.id) {
                    continue;
                }
                let timestamp = post.epoch_seconds();
                let item = RecommendationItem {
                    post,
                    recommendation_type: RecommendationType::Location,
                    distance_km: Some(geo::round_distance_km(distance)),
                    business_plan: Some(owner.plan),
                    author: Some(author.clone()),
                };
                if timestamp >= recent_cutoff {
                    recent.push(item);
                } else {
                    older.push(item);
                }
            }

            if recent.is_empty() && older.is_empty() {
                continue;
            }
            recent.sort_by(newest_first);
            older.sort_by(newest_first);
            accepted.push(NearbyBusiness { distance_km: distance, plan: owner.plan, recent, older });
        }

        accepted.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.plan.sort_rank().cmp(&b.plan.sort_rank()))
        });

        // Round-robin over recent posts: one post per business per round, so
        // every nearby business surfaces before any business goes deep.
        let mut result: Vec<RecommendationItem> = Vec::new();
        for round in 0..self.config.posts_per_business {
            for business in &accepted {
                if let Some(item) = business.recent.get(round) {
                    result.push(item.clone());
                }
            }
        }

        // Older posts only pad businesses that had nothing recent, and only
        // while the pool is short of twice the quota.
        if result.len() < quota * 2 {
            for business in &accepted {
                if business.recent.is_empty() {
                    result.extend(
                        business.older.iter().take(self.config.posts_per_business).cloned(),
                    );
                }
            }
        }

        result.sort_by(|a, b| {
            let da = a.distance_km.unwrap_or(f64::INFINITY);
            let db = b.distance_km.unwrap_or(f64::INFINITY);
            da.total_cmp(&db)
                .then_with(|| {
                    let ra = a.business_plan.unwrap_or(PlanTier::Unknown).sort_rank();
                    let rb = b.business_plan.unwrap_or(PlanTier::Unknown).sort_rank();
                    ra.cmp(&rb)
                })
                .then_with(|| b.post.epoch_seconds().total_cmp(&a.post.epoch_seconds()))
        });
        result.truncate(quota);

        debug!(businesses = accepted.len(), returned = result.len(), "nearby posts assembled");
        Ok(result)
    }
}
