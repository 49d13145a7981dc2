//! Signal providers: the four independent retrieval strategies blended into a
//! feed. Each provider is side-effect-free beyond store reads and returns at
//! most `quota` items; the composer decides how failures degrade.

mod followed;
mod nearby;
mod preferred;
mod random;

pub use followed::FollowedSignal;
pub use nearby::NearbySignal;
pub use preferred::PreferredSignal;
pub use random::RandomSignal;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::models::{GeoPoint, RecommendationItem, RecommendationType};
use crate::store::StoreError;

/// Shared per-request inputs handed to every provider.
#[derive(Debug, Clone)]
pub struct SignalContext<'a> {
    pub user_id: &'a str,
    pub following: &'a [String],
    /// Frequency-ranked preference list, most preferred first.
    pub preferred_types: &'a [String],
    pub location: Option<GeoPoint>,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait SignalSource: Send + Sync {
    fn signal(&self) -> RecommendationType;

    /// Retrieve up to `quota` candidate items, skipping ids in `excluded`.
    /// Only the random signal consumes the rng.
    async fn retrieve(
        &self,
        ctx: &SignalContext<'_>,
        quota: usize,
        excluded: &HashSet<String>,
        rng: &mut (dyn RngCore + Send),
    ) -> Result<Vec<RecommendationItem>, StoreError>;
}

/// Newest-first ordering on normalized timestamps.
pub(crate) fn newest_first(a: &RecommendationItem, b: &RecommendationItem) -> std::cmp::Ordering {
    b.post.epoch_seconds().total_cmp(&a.post.epoch_seconds())
}
