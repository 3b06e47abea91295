use chrono::{DateTime, Utc};
use shared::{ChildLocation, GyroscopeData, HeartRateData, MeltdownEvent, TYPE_GYROSCOPE, TYPE_HEART_RATE};
use std::sync::Arc;
use tracing::debug;

use crate::storage::document_store::{DocumentStore, StoreError};
use crate::storage::paths;
use crate::storage::query::{Direction, Query};
use crate::storage::subscription::{decode_body, decode_documents, decode_with_id, TypedSubscription};

/// Inclusive time window; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }
}

/// Repository for the append-only telemetry sub-collections of a child
#[derive(Clone)]
pub struct TelemetryRepository {
    store: Arc<dyn DocumentStore>,
}

impl TelemetryRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    // Locations

    pub async fn add_location(&self, guardian_id: &str, location: &ChildLocation) -> Result<String, StoreError> {
        self.store
            .add(&paths::child_locations(guardian_id, &location.child_id), serde_json::to_value(location)?)
            .await
    }

    pub async fn latest_location(&self, guardian_id: &str, child_id: &str) -> Result<Option<ChildLocation>, StoreError> {
        let documents = self
            .store
            .query(&paths::child_locations(guardian_id, child_id), &Self::latest_location_query(child_id))
            .await?;
        Ok(decode_documents(&documents, decode_body::<ChildLocation>, "location").into_iter().next())
    }

    pub async fn locations_in(
        &self,
        guardian_id: &str,
        child_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<ChildLocation>, StoreError> {
        let query = Query::new()
            .where_eq("child_id", child_id)
            .within("timestamp", window.start, window.end)
            .order_by("timestamp", Direction::Ascending);
        let documents = self.store.query(&paths::child_locations(guardian_id, child_id), &query).await?;
        Ok(decode_documents(&documents, decode_body::<ChildLocation>, "location"))
    }

    /// Emits a one-element list with the newest location (or an empty list)
    pub fn listen_latest_location(&self, guardian_id: &str, child_id: &str) -> TypedSubscription<ChildLocation> {
        let sub = self
            .store
            .listen(&paths::child_locations(guardian_id, child_id), Self::latest_location_query(child_id));
        TypedSubscription::new(sub, decode_body::<ChildLocation>, "location")
    }

    fn latest_location_query(child_id: &str) -> Query {
        Query::new()
            .where_eq("child_id", child_id)
            .order_by("timestamp", Direction::Descending)
            .limit(1)
    }

    // Bracelet samples

    pub async fn add_heart_rate(&self, guardian_id: &str, child_id: &str, sample: &HeartRateData) -> Result<String, StoreError> {
        self.store
            .add(&paths::bracelet_data(guardian_id, child_id), serde_json::to_value(sample)?)
            .await
    }

    pub async fn add_gyroscope(&self, guardian_id: &str, child_id: &str, sample: &GyroscopeData) -> Result<String, StoreError> {
        self.store
            .add(&paths::bracelet_data(guardian_id, child_id), serde_json::to_value(sample)?)
            .await
    }

    pub async fn heart_rate_in(
        &self,
        guardian_id: &str,
        child_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<HeartRateData>, StoreError> {
        let documents = self
            .store
            .query(&paths::bracelet_data(guardian_id, child_id), &Self::bracelet_query(TYPE_HEART_RATE, window))
            .await?;
        Ok(decode_documents(&documents, decode_body::<HeartRateData>, "heart rate"))
    }

    pub async fn gyroscope_in(
        &self,
        guardian_id: &str,
        child_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<GyroscopeData>, StoreError> {
        let documents = self
            .store
            .query(&paths::bracelet_data(guardian_id, child_id), &Self::bracelet_query(TYPE_GYROSCOPE, window))
            .await?;
        Ok(decode_documents(&documents, decode_body::<GyroscopeData>, "gyroscope"))
    }

    pub fn listen_heart_rate(&self, guardian_id: &str, child_id: &str, window: TimeWindow) -> TypedSubscription<HeartRateData> {
        let sub = self
            .store
            .listen(&paths::bracelet_data(guardian_id, child_id), Self::bracelet_query(TYPE_HEART_RATE, window));
        TypedSubscription::new(sub, decode_body::<HeartRateData>, "heart rate")
    }

    pub fn listen_gyroscope(&self, guardian_id: &str, child_id: &str, window: TimeWindow) -> TypedSubscription<GyroscopeData> {
        let sub = self
            .store
            .listen(&paths::bracelet_data(guardian_id, child_id), Self::bracelet_query(TYPE_GYROSCOPE, window));
        TypedSubscription::new(sub, decode_body::<GyroscopeData>, "gyroscope")
    }

    fn bracelet_query(data_type: &str, window: TimeWindow) -> Query {
        Query::new()
            .where_eq("data_type", data_type)
            .within("timestamp", window.start, window.end)
            .order_by("timestamp", Direction::Ascending)
    }

    // Meltdown events

    pub async fn add_meltdown(&self, guardian_id: &str, event: &MeltdownEvent) -> Result<String, StoreError> {
        let mut data = serde_json::to_value(event)?;
        if let Some(object) = data.as_object_mut() {
            object.remove("id");
        }
        self.store.add(&paths::meltdown_events(guardian_id, &event.child_id), data).await
    }

    pub async fn meltdowns_in(
        &self,
        guardian_id: &str,
        child_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<MeltdownEvent>, StoreError> {
        let documents = self
            .store
            .query(&paths::meltdown_events(guardian_id, child_id), &Self::meltdown_query(child_id, window))
            .await?;
        Ok(decode_documents(&documents, decode_with_id::<MeltdownEvent>, "meltdown"))
    }

    pub fn listen_meltdowns(&self, guardian_id: &str, child_id: &str, window: TimeWindow) -> TypedSubscription<MeltdownEvent> {
        let sub = self
            .store
            .listen(&paths::meltdown_events(guardian_id, child_id), Self::meltdown_query(child_id, window));
        TypedSubscription::new(sub, decode_with_id::<MeltdownEvent>, "meltdown")
    }

    fn meltdown_query(child_id: &str, window: TimeWindow) -> Query {
        Query::new()
            .where_eq("child_id", child_id)
            .within("start_time", window.start, window.end)
            .order_by("start_time", Direction::Ascending)
    }

    /// Delete every sample older than `cutoff` across the child's time-series
    /// collections, returning how many documents were removed
    pub async fn delete_older_than(
        &self,
        guardian_id: &str,
        child_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let targets = [
            (paths::child_locations(guardian_id, child_id), "timestamp"),
            (paths::bracelet_data(guardian_id, child_id), "timestamp"),
            (paths::meltdown_events(guardian_id, child_id), "start_time"),
        ];

        let mut deleted = 0;
        for (path, field) in targets.iter() {
            let stale = self
                .store
                .query(path, &Query::new().where_lt(field, cutoff.to_rfc3339()))
                .await?;
            for doc in stale {
                if self.store.delete(path, &doc.id).await? {
                    deleted += 1;
                }
            }
            debug!("Pruned {} up to {}", path, cutoff);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DbConnection;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use shared::{GeoPoint, GyroscopeValues};

    async fn setup_repo() -> (TelemetryRepository, Arc<dyn DocumentStore>) {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let store: Arc<dyn DocumentStore> = Arc::new(db);
        (TelemetryRepository::new(store.clone()), store)
    }

    fn location_at(child_id: &str, timestamp: DateTime<Utc>, latitude: f64) -> ChildLocation {
        ChildLocation {
            child_id: child_id.to_string(),
            timestamp,
            geo_point: GeoPoint::new(latitude, 2.0),
            accuracy: 5.0,
            speed: None,
        }
    }

    #[tokio::test]
    async fn test_latest_location_picks_newest() {
        let (repo, _) = setup_repo().await;
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        repo.add_location("g1", &location_at("c1", base, 1.0)).await.unwrap();
        repo.add_location("g1", &location_at("c1", base + Duration::minutes(10), 3.0)).await.unwrap();
        repo.add_location("g1", &location_at("c1", base + Duration::minutes(5), 2.0)).await.unwrap();

        let latest = repo.latest_location("g1", "c1").await.unwrap().unwrap();
        assert_eq!(latest.geo_point.latitude, 3.0);
    }

    #[tokio::test]
    async fn test_bracelet_data_is_split_by_type() {
        let (repo, store) = setup_repo().await;
        let now = Utc::now();

        repo.add_heart_rate("g1", "c1", &HeartRateData::new(now, 88)).await.unwrap();
        repo.add_gyroscope("g1", "c1", &GyroscopeData::new(now, GyroscopeValues { x: 0.1, y: 0.2, z: 0.3 }))
            .await
            .unwrap();
        // A heart-rate document missing its bpm field
        store
            .add(&paths::bracelet_data("g1", "c1"), json!({"timestamp": now.to_rfc3339(), "data_type": "heartRate"}))
            .await
            .unwrap();

        let heart = repo.heart_rate_in("g1", "c1", TimeWindow::default()).await.unwrap();
        assert_eq!(heart.len(), 1);
        assert_eq!(heart[0].heart_rate_bpm, 88);

        let gyro = repo.gyroscope_in("g1", "c1", TimeWindow::default()).await.unwrap();
        assert_eq!(gyro.len(), 1);
    }

    #[tokio::test]
    async fn test_meltdowns_carry_document_ids() {
        let (repo, _) = setup_repo().await;
        let event = MeltdownEvent {
            id: String::new(),
            child_id: "c1".to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: 120,
            severity: 7,
            trigger: Some("noise".to_string()),
            notes: None,
        };

        let id = repo.add_meltdown("g1", &event).await.unwrap();
        let stored = repo.meltdowns_in("g1", "c1", TimeWindow::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].severity, 7);
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let (repo, _) = setup_repo().await;
        let now = Utc::now();

        repo.add_location("g1", &location_at("c1", now - Duration::days(40), 1.0)).await.unwrap();
        repo.add_location("g1", &location_at("c1", now, 2.0)).await.unwrap();
        repo.add_heart_rate("g1", "c1", &HeartRateData::new(now - Duration::days(31), 70)).await.unwrap();

        let deleted = repo.delete_older_than("g1", "c1", now - Duration::days(30)).await.unwrap();
        assert_eq!(deleted, 2);

        let remaining = repo.locations_in("g1", "c1", TimeWindow::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(repo.heart_rate_in("g1", "c1", TimeWindow::default()).await.unwrap().is_empty());
    }
}
