//! Feed Composition Integration Tests
//!
//! Purpose: Verify the full feed pipeline against an in-memory store —
//! quota allocation, signal precedence, dedup, self-exclusion, proximity
//! gating and the distribution summary.
//!
//! Run: cargo test --test feed_composition_test

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

use recommendation_service::geo::{self, GEOHASH_PRECISION};
use recommendation_service::models::{GeoPoint, RecommendationType};
use recommendation_service::store::collections;
use recommendation_service::store::memory::MemoryStore;
use recommendation_service::utils::FixedClock;
use recommendation_service::{Config, FeedComposer};

const ORIGIN: (f64, f64) = (12.9716, 77.5946);

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn composer(store: Arc<MemoryStore>) -> FeedComposer {
    init_tracing();
    FeedComposer::new(store, Arc::new(FixedClock(now())), Config::default())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn seed_post(store: &MemoryStore, id: &str, uid: &str, seconds: f64) {
    store
        .insert(
            collections::POSTS,
            id,
            json!({"uid": uid, "createdAt": {"seconds": seconds}}),
        )
        .await;
}

#[tokio::test]
async fn followed_posts_come_before_random_ones() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert(collections::USERS, "alice", json!({})).await;
    store.insert(collections::USERS, "b1", json!({"businessName": "B One"})).await;
    store.insert(&collections::following("alice"), "b1", json!({})).await;

    let base = now().timestamp() as f64;
    // Five posts from the followed business, two within the last hour.
    seed_post(&store, "b1-new1", "b1", base - 600.0).await;
    seed_post(&store, "b1-new2", "b1", base - 1200.0).await;
    for i in 0..3 {
        seed_post(&store, &format!("b1-old{i}"), "b1", base - 90_000.0 - i as f64).await;
    }
    // Background noise from unfollowed businesses.
    for i in 0..8 {
        seed_post(&store, &format!("noise{i}"), &format!("z{i}"), base - 5_000.0 - i as f64).await;
    }

    let composer = composer(store);
    let mut rng = StdRng::seed_from_u64(3);
    let page = composer
        .compose_simple_recommendations("alice", 10, &mut rng)
        .await?;

    let ids: Vec<&str> = page.items.iter().map(|i| i.post.id.as_str()).collect();
    assert!(ids.contains(&"b1-new1"));
    assert!(ids.contains(&"b1-new2"));

    // Every followed item outranks every random item even after the
    // segment shuffle.
    let last_followed = page
        .items
        .iter()
        .rposition(|i| i.recommendation_type == RecommendationType::Followed);
    let first_random = page
        .items
        .iter()
        .position(|i| i.recommendation_type == RecommendationType::Random);
    if let (Some(last_followed), Some(first_random)) = (last_followed, first_random) {
        assert!(last_followed < first_random);
    }
    assert_eq!(page.distribution.followed, 3);
    Ok(())
}

#[tokio::test]
async fn feed_deduplicates_and_never_recommends_self() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert(collections::USERS, "alice", json!({})).await;
    store
        .insert(collections::USERS, "b1", json!({"businessType": "cafe", "businessName": "Cafe"}))
        .await;
    store.insert(&collections::following("alice"), "b1", json!({})).await;

    let base = now().timestamp() as f64;
    // b1's posts are both followed and preferred-type candidates.
    for i in 0..4 {
        store
            .insert(
                collections::POSTS,
                &format!("b1-p{i}"),
                json!({"uid": "b1", "businessType": "cafe", "createdAt": {"seconds": base - i as f64}}),
            )
            .await;
    }
    // Alice's own posts must never surface.
    for i in 0..3 {
        seed_post(&store, &format!("own{i}"), "alice", base - 10.0 - i as f64).await;
    }
    for i in 0..6 {
        seed_post(&store, &format!("other{i}"), &format!("z{i}"), base - 100.0 - i as f64).await;
    }

    let composer = composer(store);
    let mut rng = StdRng::seed_from_u64(9);
    let page = composer.compose_feed("alice", 10, None, &mut rng).await?;

    let mut seen = HashSet::new();
    for item in &page.items {
        assert_ne!(item.post.uid, "alice");
        assert!(seen.insert(item.post.id.clone()), "duplicate item {}", item.post.id);
    }
    assert_eq!(page.distribution.total(), page.items.len());
    for item in &page.items {
        assert!(page.distribution.count(item.recommendation_type) > 0);
    }
    Ok(())
}

#[tokio::test]
async fn located_feed_puts_nearby_posts_first_and_enriches_them() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let origin = GeoPoint::new(ORIGIN.0, ORIGIN.1);
    store
        .insert(
            collections::USERS,
            "alice",
            json!({"location": {"latitude": ORIGIN.0, "longitude": ORIGIN.1}}),
        )
        .await;

    // A free-plan cafe roughly 1 km north with fresh posts.
    let lat = ORIGIN.0 + 1.0 / 111.0;
    store
        .insert(
            collections::BUSINESSES,
            "near",
            json!({
                "businessName": "Near Cafe",
                "location": {"latitude": lat, "longitude": ORIGIN.1},
            }),
        )
        .await;
    store
        .insert(
            collections::USERS,
            "near",
            json!({
                "role": "business",
                "plan": "free",
                "businessName": "Near Cafe",
                "username": "nearcafe",
            }),
        )
        .await;
    let base = now().timestamp() as f64;
    for i in 0..2 {
        seed_post(&store, &format!("near-p{i}"), "near", base - 3600.0 - i as f64).await;
    }
    let cell = geo::encode_geohash(ORIGIN.0, ORIGIN.1, GEOHASH_PRECISION);
    store
        .insert(collections::LOCATION_INDEX, &cell, json!({"business_ids": ["near"]}))
        .await;

    for i in 0..8 {
        seed_post(&store, &format!("far{i}"), &format!("z{i}"), base - 50.0 - i as f64).await;
    }

    let composer = composer(store);
    let mut rng = StdRng::seed_from_u64(5);
    let page = composer
        .compose_feed("alice", 10, Some(origin), &mut rng)
        .await?;

    assert_eq!(page.items[0].recommendation_type, RecommendationType::Location);
    assert_eq!(page.items[0].post.uid, "near");
    let distance = page.items[0].distance_km.unwrap();
    assert!((0.5..=1.5).contains(&distance), "distance {distance}");
    let author = page.items[0].author.as_ref().unwrap();
    assert_eq!(author.username, "nearcafe");
    assert_eq!(page.distribution.location, 2);

    // Items carrying a distance sort ahead of those without one.
    let first_unlocated = page.items.iter().position(|i| i.distance_km.is_none());
    if let Some(first_unlocated) = first_unlocated {
        assert!(page.items[..first_unlocated]
            .iter()
            .all(|i| i.distance_km.is_some()));
    }
    Ok(())
}

#[tokio::test]
async fn limit_is_honored_and_random_fills_shortfall() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert(collections::USERS, "alice", json!({})).await;

    let base = now().timestamp() as f64;
    for i in 0..40 {
        seed_post(&store, &format!("p{i}"), &format!("z{}", i % 7), base - i as f64).await;
    }

    let composer = composer(store);
    let mut rng = StdRng::seed_from_u64(11);
    let page = composer.compose_feed("alice", 6, None, &mut rng).await?;

    assert_eq!(page.items.len(), 6);
    // No following, no preferences: everything falls through to random.
    assert_eq!(page.distribution.random, 6);
    assert!(page.unique_businesses >= 1);
    assert!(page.max_posts_per_business <= 6);
    Ok(())
}
