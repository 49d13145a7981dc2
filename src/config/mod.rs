use std::env;

/// Per-entry-point signal weights. `random` is nominal only: after the other
/// quotas are carved out, every remaining slot (including integer-rounding
/// leftovers and shortfall from earlier signals) goes to the random signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalWeights {
    pub location: f32,
    pub followed: f32,
    pub preferred: f32,
    pub random: f32,
}

impl SignalWeights {
    pub fn feed_with_location() -> Self {
        Self { location: 0.4, followed: 0.3, preferred: 0.2, random: 0.1 }
    }

    pub fn feed_without_location() -> Self {
        Self { location: 0.0, followed: 0.4, preferred: 0.4, random: 0.2 }
    }

    pub fn simple() -> Self {
        Self { location: 0.0, followed: 0.3, preferred: 0.3, random: 0.1 }
    }

    /// Integer quotas for `limit` slots. The random quota absorbs all
    /// rounding, so the quotas always sum to exactly `limit`.
    pub fn allocate(&self, limit: usize) -> SignalQuotas {
        let location = (limit as f32 * self.location) as usize;
        let followed = (limit as f32 * self.followed) as usize;
        let preferred = (limit as f32 * self.preferred) as usize;
        let random = limit.saturating_sub(location + followed + preferred);
        SignalQuotas { location, followed, preferred, random }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuotas {
    pub location: usize,
    pub followed: usize,
    pub preferred: usize,
    pub random: usize,
}

impl SignalQuotas {
    pub fn total(&self) -> usize {
        self.location + self.followed + self.preferred + self.random
    }
}

/// Knobs of the proximity signal.
#[derive(Debug, Clone, Copy)]
pub struct NearbyConfig {
    /// Posts newer than this many days count as "recent".
    pub recent_window_days: i64,
    /// Cap on posts surfaced from a single business.
    pub posts_per_business: usize,
    /// How many newest posts to pull per accepted business before filtering.
    pub per_business_fetch: usize,
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self { recent_window_days: 5, posts_per_business: 3, per_business_fetch: 10 }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub nearby: NearbyConfig,
    pub feed_with_location: SignalWeights,
    pub feed_without_location: SignalWeights,
    pub simple: SignalWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nearby: NearbyConfig::default(),
            feed_with_location: SignalWeights::feed_with_location(),
            feed_without_location: SignalWeights::feed_without_location(),
            simple: SignalWeights::simple(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = NearbyConfig::default();
        Config {
            nearby: NearbyConfig {
                recent_window_days: env_or("NEARBY_RECENT_WINDOW_DAYS", defaults.recent_window_days),
                posts_per_business: env_or("NEARBY_POSTS_PER_BUSINESS", defaults.posts_per_business),
                per_business_fetch: env_or("NEARBY_PER_BUSINESS_FETCH", defaults.per_business_fetch),
            },
            ..Config::default()
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid value")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotas_sum_to_limit_exactly() {
        for limit in 0..=50 {
            for weights in [
                SignalWeights::feed_with_location(),
                SignalWeights::feed_without_location(),
                SignalWeights::simple(),
            ] {
                assert_eq!(weights.allocate(limit).total(), limit);
            }
        }
    }

    #[test]
    fn with_location_quotas_match_expected_split() {
        let quotas = SignalWeights::feed_with_location().allocate(10);
        assert_eq!(quotas.location, 4);
        assert_eq!(quotas.followed, 3);
        assert_eq!(quotas.preferred, 2);
        assert_eq!(quotas.random, 1);
    }

    #[test]
    fn without_location_gives_location_zero() {
        let quotas = SignalWeights::feed_without_location().allocate(10);
        assert_eq!(quotas.location, 0);
        assert_eq!(quotas.followed, 4);
        assert_eq!(quotas.preferred, 4);
        assert_eq!(quotas.random, 2);
    }
}
