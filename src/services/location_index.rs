//! Geohash maintenance: keeps each business's cached geohash and the
//! cell-to-businesses index in sync with its raw coordinates. The only writes
//! this crate performs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::geo::{self, GEOHASH_PRECISION};
use crate::models::Business;
use crate::store::{collections, DocumentStore, FieldOp, StoreError};
use crate::utils::Clock;

pub struct LocationIndexMaintenance {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl LocationIndexMaintenance {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Recompute one business's geohash and union its id into the matching
    /// index cell. Missing or unlocated businesses are a no-op; the whole
    /// operation is idempotent and safe to retry.
    pub async fn refresh_geohash(&self, business_id: &str) -> Result<(), StoreError> {
        let Some(doc) = self.store.get_by_id(collections::BUSINESSES, business_id).await? else {
            return Ok(());
        };
        let Some(location) = Business::from_doc(&doc).and_then(|b| b.geo()) else {
            return Ok(());
        };

        let cell = geo::encode_geohash(location.latitude, location.longitude, GEOHASH_PRECISION);
        let now = self.clock.now().to_rfc3339();

        self.store
            .upsert_merge(
                collections::BUSINESSES,
                business_id,
                json!({"geohash": cell, "locationUpdatedAt": now}),
            )
            .await?;

        // Read-union-write on the cell membership; re-adding an id that is
        // already listed leaves the cell unchanged.
        let mut business_ids: Vec<String> = match self
            .store
            .get_by_id(collections::LOCATION_INDEX, &cell)
            .await?
        {
            Some(cell_doc) => cell_doc
                .fields
                .get("business_ids")
                .and_then(|v| v.as_array())
                .map(|listed| {
                    listed
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };
        if !business_ids.iter().any(|id| id == business_id) {
            business_ids.push(business_id.to_string());
        }

        self.store
            .upsert_merge(
                collections::LOCATION_INDEX,
                &cell,
                json!({"business_ids": business_ids, "updatedAt": now}),
            )
            .await?;

        debug!(business_id, cell = %cell, "geohash refreshed");
        Ok(())
    }

    /// Refresh every business whose `locationUpdatedAt` predates
    /// `older_than`. Individual failures are logged and skipped so one bad
    /// document cannot stall the batch. Returns how many refreshed cleanly.
    pub async fn refresh_stale_geohashes(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let stale = self
            .store
            .query_by_field(
                collections::BUSINESSES,
                "locationUpdatedAt",
                FieldOp::Lt,
                json!(older_than.to_rfc3339()),
                None,
                None,
            )
            .await?;

        let mut refreshed = 0;
        for doc in &stale {
            match self.refresh_geohash(&doc.id).await {
                Ok(()) => refreshed += 1,
                Err(err) => {
                    warn!(business_id = %doc.id, error = %err, "geohash refresh skipped");
                }
            }
        }
        debug!(stale = stale.len(), refreshed, "stale geohash sweep complete");
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::utils::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    fn maintenance(store: Arc<MemoryStore>) -> LocationIndexMaintenance {
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()));
        LocationIndexMaintenance::new(store, clock)
    }

    #[tokio::test]
    async fn writes_geohash_and_unions_index_cell() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(
                collections::BUSINESSES,
                "b1",
                json!({"location": {"latitude": 48.8583, "longitude": 2.2945}}),
            )
            .await;

        let m = maintenance(store.clone());
        m.refresh_geohash("b1").await.unwrap();

        let business = store
            .get_by_id(collections::BUSINESSES, "b1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(business.str_field("geohash"), Some("u09tun"));
        assert!(business.str_field("locationUpdatedAt").is_some());

        let cell = store
            .get_by_id(collections::LOCATION_INDEX, "u09tun")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cell.fields["business_ids"], json!(["b1"]));

        // Retrying must not duplicate the membership.
        m.refresh_geohash("b1").await.unwrap();
        let cell = store
            .get_by_id(collections::LOCATION_INDEX, "u09tun")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cell.fields["business_ids"], json!(["b1"]));
    }

    #[tokio::test]
    async fn missing_or_unlocated_business_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(collections::BUSINESSES, "no-loc", json!({"businessName": "No Loc"}))
            .await;

        let m = maintenance(store.clone());
        m.refresh_geohash("ghost").await.unwrap();
        m.refresh_geohash("no-loc").await.unwrap();

        let business = store
            .get_by_id(collections::BUSINESSES, "no-loc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(business.str_field("geohash"), None);
    }

    #[tokio::test]
    async fn sweep_refreshes_only_stale_businesses() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        store
            .insert(
                collections::BUSINESSES,
                "stale",
                json!({
                    "location": {"latitude": 12.9716, "longitude": 77.5946},
                    "locationUpdatedAt": (now - Duration::days(3)).to_rfc3339(),
                }),
            )
            .await;
        store
            .insert(
                collections::BUSINESSES,
                "fresh",
                json!({
                    "location": {"latitude": 12.9716, "longitude": 77.5946},
                    "locationUpdatedAt": now.to_rfc3339(),
                }),
            )
            .await;

        let m = maintenance(store.clone());
        let refreshed = m
            .refresh_stale_geohashes(now - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(refreshed, 1);

        let stale = store
            .get_by_id(collections::BUSINESSES, "stale")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stale.str_field("geohash"), Some("tdr1v9"));
    }
}
