//! Feed composition: allocates per-signal quotas, invokes providers in
//! priority order with a global dedup set, enriches items with distance and
//! author info, and produces the final ordering plus a distribution summary.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::geo;
use crate::models::{
    Business, FeedPage, GeoPoint, RecommendationItem, RecommendationType, SignalDistribution,
    User,
};
use crate::store::{batch, collections, DocumentStore, StoreError};
use crate::utils::Clock;

use super::profile::{self, UserProfile};
use super::signals::{
    FollowedSignal, NearbySignal, PreferredSignal, RandomSignal, SignalContext, SignalSource,
};

pub struct FeedComposer {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: Config,
    sources: Vec<Box<dyn SignalSource>>,
}

impl FeedComposer {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: Config) -> Self {
        let sources: Vec<Box<dyn SignalSource>> = vec![
            Box::new(NearbySignal::new(store.clone(), config.nearby)),
            Box::new(FollowedSignal::new(store.clone())),
            Box::new(PreferredSignal::new(store.clone())),
            Box::new(RandomSignal::new(store.clone())),
        ];
        Self { store, clock, config, sources }
    }

    /// The richer feed path: location-aware weights, per-item enrichment and
    /// a distance-then-priority final ordering.
    pub async fn compose_feed(
        &self,
        user_id: &str,
        limit: usize,
        location_override: Option<GeoPoint>,
        rng: &mut (dyn RngCore + Send),
    ) -> Result<FeedPage> {
        let profile = profile::load_profile(&*self.store, user_id).await?;
        let location = location_override
            .and_then(GeoPoint::validated)
            .or_else(|| profile.user.geo());

        let weights = if location.is_some() {
            self.config.feed_with_location
        } else {
            self.config.feed_without_location
        };
        let quotas = weights.allocate(limit);

        let ctx = signal_context(user_id, &profile, location, self.clock.now());
        let mut seen: HashSet<String> = HashSet::new();
        let mut items: Vec<RecommendationItem> = Vec::new();

        for source in &self.sources {
            let signal = source.signal();
            let quota = match signal {
                RecommendationType::Location => quotas.location,
                RecommendationType::Followed => quotas.followed,
                RecommendationType::Preferred => quotas.preferred,
                // The random signal fills every slot the earlier signals
                // could not, not just its nominal share.
                RecommendationType::Random => limit.saturating_sub(items.len()),
            };
            if quota == 0 {
                continue;
            }

            // Nearby over-fetches so the composer can keep the closest slice.
            let ask = if signal == RecommendationType::Location { quota * 2 } else { quota };
            let mut fetched = self.retrieve_degrading(source.as_ref(), &ctx, ask, &seen, rng).await;
            if signal == RecommendationType::Location {
                fetched.sort_by(|a, b| {
                    a.distance_km
                        .unwrap_or(f64::INFINITY)
                        .total_cmp(&b.distance_km.unwrap_or(f64::INFINITY))
                });
                fetched.truncate(quota);
            }

            for mut item in fetched {
                if seen.insert(item.post.id.clone()) {
                    item.recommendation_type = signal;
                    items.push(item);
                }
            }
        }

        if let Err(err) = self.enrich(&mut items, user_id, location).await {
            warn!(error = %err, "feed enrichment degraded, returning unenriched items");
        }

        items.sort_by(feed_order);
        items.retain(|item| item.post.uid != user_id);
        items.truncate(limit);

        let page = into_page(items);
        info!(
            user_id,
            total = page.items.len(),
            location = page.distribution.location,
            followed = page.distribution.followed,
            preferred = page.distribution.preferred,
            random = page.distribution.random,
            unique_businesses = page.unique_businesses,
            "feed composed"
        );
        Ok(page)
    }

    /// The simpler, location-free path with fixed weights and a per-segment
    /// shuffle on top of the priority ordering.
    pub async fn compose_simple_recommendations(
        &self,
        user_id: &str,
        limit: usize,
        rng: &mut (dyn RngCore + Send),
    ) -> Result<FeedPage> {
        let profile = profile::load_profile(&*self.store, user_id).await?;
        let quotas = self.config.simple.allocate(limit);
        let ctx = signal_context(user_id, &profile, None, self.clock.now());

        let mut seen: HashSet<String> = HashSet::new();
        let mut items: Vec<RecommendationItem> = Vec::new();

        for source in &self.sources {
            let signal = source.signal();
            let quota = match signal {
                RecommendationType::Location => continue,
                RecommendationType::Followed => quotas.followed,
                RecommendationType::Preferred => quotas.preferred,
                RecommendationType::Random => limit.saturating_sub(items.len()),
            };
            if quota == 0 {
                continue;
            }

            let fetched = self.retrieve_degrading(source.as_ref(), &ctx, quota, &seen, rng).await;
            for item in fetched {
                if seen.insert(item.post.id.clone()) {
                    items.push(item);
                }
            }
        }

        // Shuffle within equal-size contiguous segments: coarse signal
        // priority survives, strict intra-segment ordering does not.
        let segment = items.len() / 3;
        if segment > 0 {
            for chunk in items.chunks_mut(segment) {
                chunk.shuffle(&mut *rng);
            }
        }
        items.truncate(limit);

        let page = into_page(items);
        info!(user_id, total = page.items.len(), "simple recommendations composed");
        Ok(page)
    }

    async fn retrieve_degrading(
        &self,
        source: &dyn SignalSource,
        ctx: &SignalContext<'_>,
        quota: usize,
        excluded: &HashSet<String>,
        rng: &mut (dyn RngCore + Send),
    ) -> Vec<RecommendationItem> {
        match source.retrieve(ctx, quota, excluded, rng).await {
            Ok(items) => items,
            Err(err) => {
                warn!(signal = source.signal().as_str(), error = %err, "signal degraded to empty");
                Vec::new()
            }
        }
    }

    /// Attach author summaries to every item and recompute distances where
    /// the requester location and the owner's business location are known.
    async fn enrich(
        &self,
        items: &mut [RecommendationItem],
        user_id: &str,
        location: Option<GeoPoint>,
    ) -> std::result::Result<(), StoreError> {
        let mut uids: Vec<String> = items
            .iter()
            .map(|item| item.post.uid.clone())
            .filter(|uid| uid != user_id && !uid.is_empty())
            .collect();
        uids.sort();
        uids.dedup();
        if uids.is_empty() {
            return Ok(());
        }

        let businesses = batch::fetch_map(&*self.store, collections::BUSINESSES, &uids).await?;
        let owners = batch::fetch_map(&*self.store, collections::USERS, &uids).await?;

        for item in items.iter_mut() {
            let uid = item.post.uid.clone();
            if uid == user_id {
                continue;
            }

            if item.distance_km.is_none() {
                if let (Some(origin), Some(target)) = (
                    location,
                    businesses
                        .get(&uid)
                        .and_then(|doc| Business::from_doc(doc))
                        .and_then(|b| b.geo()),
                ) {
                    let distance = geo::haversine_distance_km(
                        origin.latitude,
                        origin.longitude,
                        target.latitude,
                        target.longitude,
                    );
                    item.distance_km = Some(geo::round_distance_km(distance));
                }
            }

            if item.author.is_none() {
                if let Some(owner) = owners.get(&uid).and_then(|doc| User::from_doc(doc)) {
                    item.author = Some(owner.author_summary());
                }
            }
        }
        Ok(())
    }
}

fn signal_context<'a>(
    user_id: &'a str,
    profile: &'a UserProfile,
    location: Option<GeoPoint>,
    now: chrono::DateTime<chrono::Utc>,
) -> SignalContext<'a> {
    SignalContext {
        user_id,
        following: &profile.following,
        preferred_types: &profile.preferred_types,
        location,
        now,
    }
}

/// Items with a known distance sort by it; the rest sort behind them, ordered
/// by signal priority and then recency.
fn feed_order(a: &RecommendationItem, b: &RecommendationItem) -> Ordering {
    let da = a.distance_km.unwrap_or(f64::INFINITY);
    let db = b.distance_km.unwrap_or(f64::INFINITY);
    da.total_cmp(&db)
        .then_with(|| {
            a.recommendation_type
                .priority()
                .cmp(&b.recommendation_type.priority())
        })
        .then_with(|| b.post.epoch_seconds().total_cmp(&a.post.epoch_seconds()))
}

fn into_page(items: Vec<RecommendationItem>) -> FeedPage {
    let mut distribution = SignalDistribution::default();
    let mut per_business: HashMap<&str, usize> = HashMap::new();
    for item in &items {
        distribution.record(item.recommendation_type);
        *per_business.entry(item.post.uid.as_str()).or_default() += 1;
    }
    let unique_businesses = per_business.len();
    let max_posts_per_business = per_business.values().copied().max().unwrap_or(0);

    FeedPage { items, distribution, unique_businesses, max_posts_per_business }
}
