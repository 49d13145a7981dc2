mod timestamp;

pub use timestamp::CreatedAt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::Document;

/// Validated coordinate pair. Construct through [`GeoPoint::validated`] or
/// [`Location::point`]; out-of-range coordinates degrade to "no location".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn validated(self) -> Option<GeoPoint> {
        if (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude) {
            Some(self)
        } else {
            warn!(
                latitude = self.latitude,
                longitude = self.longitude,
                "out-of-range coordinates, treating as no location"
            );
            None
        }
    }
}

/// Raw location field as stored; either coordinate may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Location {
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).validated(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Business,
    #[serde(other)]
    Unknown,
}

/// Subscription tier of a business account. Gates the visibility radius for
/// proximity recommendations and breaks ties in distance-equal orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Premium,
    Standard,
    #[default]
    Free,
    #[serde(other)]
    Unknown,
}

impl PlanTier {
    /// How far away a business on this plan is still shown as "nearby".
    pub fn radius_km(self) -> f64 {
        match self {
            PlanTier::Premium => 8.0,
            PlanTier::Standard => 4.0,
            PlanTier::Free | PlanTier::Unknown => 2.0,
        }
    }

    /// Ascending sort rank: higher tiers first.
    pub fn sort_rank(self) -> u8 {
        match self {
            PlanTier::Premium => 0,
            PlanTier::Standard => 1,
            PlanTier::Free => 2,
            PlanTier::Unknown => 3,
        }
    }

    /// Flat score bonus on the directory endpoint.
    pub fn directory_bonus(self) -> f64 {
        match self {
            PlanTier::Premium => 3.0,
            PlanTier::Standard => 2.0,
            PlanTier::Free => 1.0,
            PlanTier::Unknown => 0.0,
        }
    }
}

/// Which signal produced an item. Doubles as a sort tie-break and as the key
/// of the per-response distribution summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationType {
    Location,
    Followed,
    Preferred,
    Random,
}

impl RecommendationType {
    pub fn priority(self) -> u8 {
        match self {
            RecommendationType::Location => 0,
            RecommendationType::Followed => 1,
            RecommendationType::Preferred => 2,
            RecommendationType::Random => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationType::Location => "location",
            RecommendationType::Followed => "followed",
            RecommendationType::Preferred => "preferred",
            RecommendationType::Random => "random",
        }
    }
}

/// Account document. Business accounts live in the same key space and carry
/// the business-facing display fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    #[serde(skip_deserializing)]
    pub id: String,
    pub location: Option<Location>,
    pub business_preferences: Vec<String>,
    pub role: Role,
    pub plan: PlanTier,
    pub business_type: Option<String>,
    pub business_name: String,
    pub username: String,
    pub profile_pic: String,
    pub profile_image: String,
}

impl User {
    pub fn from_doc(doc: &Document) -> Option<User> {
        decode(doc, |user: &mut User, id| user.id = id)
    }

    pub fn geo(&self) -> Option<GeoPoint> {
        self.location.as_ref().and_then(Location::point)
    }

    pub fn author_summary(&self) -> AuthorSummary {
        AuthorSummary {
            business_name: self.business_name.clone(),
            username: self.username.clone(),
            profile_pic: self.profile_pic.clone(),
        }
    }
}

/// Business profile document (location ground truth plus the cached geohash).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Business {
    #[serde(skip_deserializing)]
    pub id: String,
    pub business_name: String,
    pub username: String,
    pub business_type: Option<String>,
    pub location: Option<Location>,
    pub geohash: Option<String>,
}

impl Business {
    pub fn from_doc(doc: &Document) -> Option<Business> {
        decode(doc, |business: &mut Business, id| business.id = id)
    }

    pub fn geo(&self) -> Option<GeoPoint> {
        self.location.as_ref().and_then(Location::point)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Post {
    #[serde(skip_deserializing)]
    pub id: String,
    pub uid: String,
    pub business_type: Option<String>,
    pub created_at: CreatedAt,
}

impl Post {
    pub fn from_doc(doc: &Document) -> Option<Post> {
        decode(doc, |post: &mut Post, id| post.id = id)
    }

    pub fn epoch_seconds(&self) -> f64 {
        self.created_at.epoch_seconds()
    }
}

fn decode<T>(doc: &Document, set_id: impl FnOnce(&mut T, String)) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    match serde_json::from_value::<T>(doc.fields.clone()) {
        Ok(mut value) => {
            set_id(&mut value, doc.id.clone());
            Some(value)
        }
        Err(err) => {
            warn!(id = %doc.id, error = %err, "skipping malformed document");
            None
        }
    }
}

/// Display info attached to feed items so clients render without extra reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub business_name: String,
    pub username: String,
    pub profile_pic: String,
}

/// A post enriched for one response. Created fresh per request, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationItem {
    #[serde(flatten)]
    pub post: Post,
    pub recommendation_type: RecommendationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_plan: Option<PlanTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorSummary>,
}

impl RecommendationItem {
    pub fn new(post: Post, recommendation_type: RecommendationType) -> Self {
        Self {
            post,
            recommendation_type,
            distance_km: None,
            business_plan: None,
            author: None,
        }
    }
}

/// A scored business/user candidate for the entity endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct EntityRecommendation {
    pub id: String,
    #[serde(rename = "businessName")]
    pub business_name: String,
    pub username: String,
    #[serde(rename = "businessType")]
    pub business_type: String,
    #[serde(rename = "profileImage")]
    pub profile_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub score: f64,
    pub recommendation_type: RecommendationType,
    pub has_activity: bool,
}

/// Per-signal item counts for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalDistribution {
    pub location: usize,
    pub followed: usize,
    pub preferred: usize,
    pub random: usize,
}

impl SignalDistribution {
    pub fn record(&mut self, signal: RecommendationType) {
        match signal {
            RecommendationType::Location => self.location += 1,
            RecommendationType::Followed => self.followed += 1,
            RecommendationType::Preferred => self.preferred += 1,
            RecommendationType::Random => self.random += 1,
        }
    }

    pub fn count(&self, signal: RecommendationType) -> usize {
        match signal {
            RecommendationType::Location => self.location,
            RecommendationType::Followed => self.followed,
            RecommendationType::Preferred => self.preferred,
            RecommendationType::Random => self.random,
        }
    }

    pub fn total(&self) -> usize {
        self.location + self.followed + self.preferred + self.random
    }
}

/// Composed feed plus the metadata summary handed to the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<RecommendationItem>,
    pub distribution: SignalDistribution,
    pub unique_businesses: usize,
    pub max_posts_per_business: usize,
}

/// Ranked entities plus distribution counts.
#[derive(Debug, Clone, Serialize)]
pub struct EntityPage {
    pub items: Vec<EntityRecommendation>,
    pub distribution: SignalDistribution,
}

/// How the directory endpoint ranks its page: nearest-first within each
/// plan's visibility radius, or most-active-first with no radius gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryMode {
    Location,
    Activity,
}

/// One directory row: the base factor score plus the mode-dependent total
/// actually used for ranking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub id: String,
    pub business_name: String,
    pub username: String,
    pub business_type: String,
    pub profile_image: String,
    pub business_plan: PlanTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub score: f64,
    pub total_score: f64,
    pub has_activity: bool,
}

/// One page of the business directory.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryPage {
    pub items: Vec<DirectoryListing>,
    pub total: usize,
    pub has_more: bool,
    pub mode: DirectoryMode,
}
