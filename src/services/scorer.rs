//! Entity scoring: ranks businesses and business-role users (not posts) for
//! the recommendation, who-to-follow and directory endpoints. All three share
//! the same factor shape (preference rank, proximity, activity) with
//! per-endpoint weights.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::geo;
use crate::models::{
    Business, DirectoryListing, DirectoryMode, DirectoryPage, EntityPage, EntityRecommendation,
    GeoPoint, RecommendationType, SignalDistribution, User,
};
use crate::store::{batch, collections, DocumentStore, FieldOp};

use super::profile;

/// Proximity contributes nothing beyond this distance, on every endpoint.
const PROXIMITY_CUTOFF_KM: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct DirectoryQuery {
    pub limit: usize,
    pub offset: usize,
    pub location_override: Option<GeoPoint>,
    pub mode: DirectoryMode,
}

pub struct EntityScorer {
    store: Arc<dyn DocumentStore>,
}

impl EntityScorer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Businesses the user might want to follow, ranked by a light blend of
    /// preference rank, proximity and activity.
    pub async fn recommend_entities(
        &self,
        user_id: &str,
        limit: usize,
        location_override: Option<GeoPoint>,
    ) -> Result<EntityPage> {
        let profile = profile::load_profile(&*self.store, user_id).await?;
        let location = location_override
            .and_then(GeoPoint::validated)
            .or_else(|| profile.user.geo());

        let docs = self.store.list(collections::BUSINESSES, None, None).await?;
        let candidates: Vec<Business> = docs
            .iter()
            .filter(|doc| doc.id != user_id && !profile.following.contains(&doc.id))
            .filter_map(Business::from_doc)
            .collect();

        let ids: Vec<String> = candidates.iter().map(|b| b.id.clone()).collect();
        let owners = batch::fetch_map(&*self.store, collections::USERS, &ids).await?;
        let active = batch::posts_exist_for(&*self.store, &ids).await?;

        let mut items: Vec<EntityRecommendation> = Vec::new();
        for business in candidates {
            let business_type = business.business_type.clone().unwrap_or_default();
            let preference_rank = rank_of(&profile.preferred_types, &business_type);
            let profile_image = owners
                .get(&business.id)
                .and_then(|doc| User::from_doc(doc))
                .map(|owner| owner.profile_image)
                .unwrap_or_default();

            let mut score = preference_rank.map_or(0.0, |rank| 1.0 / (rank as f64 + 1.0));
            let distance_km = measure(location, business.geo());
            if let Some(d) = distance_km {
                if d <= PROXIMITY_CUTOFF_KM {
                    score += (1.0 - d / 5.0).max(0.0);
                }
            }
            let has_activity = active.contains(&business.id);
            if has_activity {
                score += 0.5;
            }

            items.push(EntityRecommendation {
                id: business.id,
                business_name: business.business_name,
                username: business.username,
                business_type,
                profile_image,
                distance_km: distance_km.map(geo::round_distance_km),
                score,
                recommendation_type: entity_tag(distance_km.is_some(), preference_rank.is_some()),
                has_activity,
            });
        }

        Ok(finish_entity_page(items, limit, user_id, "recommend_entities"))
    }

    /// Business-role accounts ranked with heavier preference and proximity
    /// weights plus a liked-type bonus.
    pub async fn who_to_follow(
        &self,
        user_id: &str,
        limit: usize,
        location_override: Option<GeoPoint>,
    ) -> Result<EntityPage> {
        let profile = profile::load_profile(&*self.store, user_id).await?;
        let liked_types = profile::load_liked_types(&*self.store, user_id).await?;
        let location = location_override
            .and_then(GeoPoint::validated)
            .or_else(|| profile.user.geo());

        let docs = self
            .store
            .query_by_field(collections::USERS, "role", FieldOp::Eq, json!("business"), None, None)
            .await?;
        let candidates: Vec<User> = docs
            .iter()
            .filter(|doc| doc.id != user_id && !profile.following.contains(&doc.id))
            .filter_map(User::from_doc)
            .collect();

        let ids: Vec<String> = candidates.iter().map(|u| u.id.clone()).collect();
        let active = batch::posts_exist_for(&*self.store, &ids).await?;

        let mut items: Vec<EntityRecommendation> = Vec::new();
        for candidate in candidates {
            let business_type = candidate.business_type.clone().unwrap_or_default();
            let preference_rank = rank_of(&profile.preferred_types, &business_type);

            let mut score = preference_rank.map_or(0.0, |rank| 5.0 / (rank as f64 + 1.0));
            if liked_types.contains(&business_type) {
                score += 3.0;
            }
            let distance_km = measure(location, candidate.geo());
            if let Some(d) = distance_km {
                if d <= PROXIMITY_CUTOFF_KM {
                    score += (4.0 - d / 5.0).max(0.0);
                }
            }
            let has_activity = active.contains(&candidate.id);
            if has_activity {
                score += 2.0;
            }

            items.push(EntityRecommendation {
                id: candidate.id,
                business_name: candidate.business_name,
                username: candidate.username,
                business_type,
                profile_image: candidate.profile_image,
                distance_km: distance_km.map(geo::round_distance_km),
                score,
                recommendation_type: entity_tag(distance_km.is_some(), preference_rank.is_some()),
                has_activity,
            });
        }

        Ok(finish_entity_page(items, limit, user_id, "who_to_follow"))
    }

    /// Paginated directory. Type weights come from liked and followed types
    /// (declared preferences do not count here); the mode decides both the
    /// admission rule and the sort.
    pub async fn browse_directory(&self, user_id: &str, query: DirectoryQuery) -> Result<DirectoryPage> {
        let profile = profile::load_profile(&*self.store, user_id).await?;
        let liked_types = profile::load_liked_types(&*self.store, user_id).await?;
        let location = query
            .location_override
            .and_then(GeoPoint::validated)
            .or_else(|| profile.user.geo());

        // Duplicates matter: following three cafes weighs "cafe" three times.
        let followed_docs =
            batch::fetch_map(&*self.store, collections::USERS, &profile.following).await?;
        let followed_types: Vec<String> = followed_docs
            .values()
            .filter_map(|doc| doc.str_field("businessType").map(str::to_string))
            .collect();

        let mut type_weights: HashMap<&str, usize> = HashMap::new();
        for tag in liked_types.iter().chain(followed_types.iter()) {
            *type_weights.entry(tag.as_str()).or_default() += 1;
        }

        let docs = self.store.list(collections::BUSINESSES, None, None).await?;
        let candidates: Vec<Business> = docs
            .iter()
            .filter(|doc| doc.id != user_id && !profile.following.contains(&doc.id))
            .filter_map(Business::from_doc)
            .collect();

        let ids: Vec<String> = candidates.iter().map(|b| b.id.clone()).collect();
        let owners = batch::fetch_map(&*self.store, collections::USERS, &ids).await?;
        let active = batch::posts_exist_for(&*self.store, &ids).await?;

        let mut listings: Vec<DirectoryListing> = Vec::new();
        for business in candidates {
            // A business without an account document has no plan and never
            // lists.
            let Some(owner) = owners.get(&business.id).and_then(|doc| User::from_doc(doc)) else {
                continue;
            };

            let business_type = business.business_type.clone().unwrap_or_default();
            let has_activity = active.contains(&business.id);

            let mut score = type_weights
                .get(business_type.as_str())
                .map_or(0.0, |count| *count as f64 * 2.0);
            if followed_types.contains(&business_type) {
                score += 3.0;
            }
            if liked_types.contains(&business_type) {
                score += 2.0;
            }
            if has_activity {
                score += 2.0;
            }
            score += owner.plan.directory_bonus();

            let distance_km = measure(location, business.geo());

            let (admitted, distance_km, total_score) = match query.mode {
                DirectoryMode::Location => match distance_km {
                    Some(d) if d <= owner.plan.radius_km() => {
                        (true, Some(d), (10.0 - d).max(0.0) + score * 0.5)
                    }
                    _ => (false, None, 0.0),
                },
                DirectoryMode::Activity => (has_activity, distance_km, score),
            };
            if !admitted {
                continue;
            }

            listings.push(DirectoryListing {
                id: business.id,
                business_name: business.business_name,
                username: owner.username,
                business_type,
                profile_image: owner.profile_pic,
                business_plan: owner.plan,
                distance_km: distance_km.map(geo::round_distance_km),
                score,
                total_score,
                has_activity,
            });
        }

        match query.mode {
            DirectoryMode::Location => listings.sort_by(|a, b| {
                sort_distance(a)
                    .total_cmp(&sort_distance(b))
                    .then_with(|| a.business_plan.sort_rank().cmp(&b.business_plan.sort_rank()))
                    .then_with(|| b.total_score.total_cmp(&a.total_score))
            }),
            DirectoryMode::Activity => listings.sort_by(|a, b| {
                b.total_score
                    .total_cmp(&a.total_score)
                    .then_with(|| a.business_plan.sort_rank().cmp(&b.business_plan.sort_rank()))
                    .then_with(|| sort_distance(a).total_cmp(&sort_distance(b)))
            }),
        }

        let total = listings.len();
        let has_more = total > query.offset + query.limit;
        let items: Vec<DirectoryListing> = listings
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();

        info!(user_id, total, page = items.len(), mode = ?query.mode, "directory page built");
        Ok(DirectoryPage { items, total, has_more, mode: query.mode })
    }
}

fn rank_of(preferred_types: &[String], business_type: &str) -> Option<usize> {
    if business_type.is_empty() {
        return None;
    }
    preferred_types.iter().position(|t| t == business_type)
}

/// Distance between the requester and a candidate, when both are located.
fn measure(origin: Option<GeoPoint>, target: Option<GeoPoint>) -> Option<f64> {
    match (origin, target) {
        (Some(a), Some(b)) => Some(geo::haversine_distance_km(
            a.latitude,
            a.longitude,
            b.latitude,
            b.longitude,
        )),
        _ => None,
    }
}

fn entity_tag(has_distance: bool, has_preference: bool) -> RecommendationType {
    if has_distance {
        RecommendationType::Location
    } else if has_preference {
        RecommendationType::Preferred
    } else {
        RecommendationType::Random
    }
}

fn sort_distance(listing: &DirectoryListing) -> f64 {
    listing.distance_km.unwrap_or(f64::INFINITY)
}

fn finish_entity_page(
    mut items: Vec<EntityRecommendation>,
    limit: usize,
    user_id: &str,
    endpoint: &str,
) -> EntityPage {
    items.sort_by(|a, b| {
        b.score.total_cmp(&a.score).then_with(|| {
            a.distance_km
                .unwrap_or(f64::INFINITY)
                .total_cmp(&b.distance_km.unwrap_or(f64::INFINITY))
        })
    });
    items.truncate(limit);

    let mut distribution = SignalDistribution::default();
    for item in &items {
        distribution.record(item.recommendation_type);
    }
    info!(user_id, endpoint, returned = items.len(), "entities scored");
    EntityPage { items, distribution }
}
