//! Telemetry ingestion and guardian-side reads.
//!
//! Child sessions append location, heart-rate, gyroscope and meltdown samples
//! under their guardian's tree. Raw bracelet messages arrive without a session
//! and are attributed through the `childId` in their payload. Guardians read
//! the same samples back one-shot, live, or as CSV.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use shared::{
    BraceletMessage, ChildLocation, GeoPoint, GyroscopeData, GyroscopeValues, HeartRateData, MeltdownEvent,
    NotificationChannel, PruneResponse, RecordGyroscopeRequest, RecordHeartRateRequest, RecordLocationRequest,
    RecordMeltdownRequest, User,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::auth_service::require_child;
use crate::domain::child_service::ChildService;
use crate::domain::errors::{GuardianError, Result};
use crate::platform::{GeofenceMonitor, Notifier};
use crate::storage::repositories::{TelemetryRepository, TimeWindow, UserRepository};
use crate::storage::TypedSubscription;

pub const MIN_HEART_RATE_BPM: u32 = 1;
pub const MAX_HEART_RATE_BPM: u32 = 300;

/// JSON body of a bracelet message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BraceletPayload {
    child_id: Option<String>,
    /// Epoch milliseconds
    timestamp: Option<i64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f32>,
    speed: Option<f32>,
    heart_rate: Option<u32>,
    x: Option<f32>,
    y: Option<f32>,
    z: Option<f32>,
}

/// What a bracelet message turned into
#[derive(Debug, Clone, PartialEq)]
pub enum BraceletOutcome {
    Location(ChildLocation),
    HeartRate(HeartRateData),
    Gyroscope(GyroscopeData),
    Ignored,
}

#[derive(Clone)]
pub struct TelemetryService {
    children: ChildService,
    users: UserRepository,
    telemetry: TelemetryRepository,
    child_monitor: Arc<dyn GeofenceMonitor>,
    notifier: Arc<dyn Notifier>,
}

impl TelemetryService {
    pub fn new(
        children: ChildService,
        users: UserRepository,
        telemetry: TelemetryRepository,
        child_monitor: Arc<dyn GeofenceMonitor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            children,
            users,
            telemetry,
            child_monitor,
            notifier,
        }
    }

    pub async fn record_location(&self, child: &User, request: RecordLocationRequest) -> Result<ChildLocation> {
        require_child(child)?;
        let (guardian_id, _) = self.children.profile_for_child(child).await?;
        let point = GeoPoint::new(request.latitude, request.longitude);
        self.store_location(
            &guardian_id,
            &child.user_id,
            point,
            request.accuracy,
            request.speed,
            request.timestamp.unwrap_or_else(Utc::now),
        )
        .await
    }

    pub async fn record_heart_rate(&self, child: &User, request: RecordHeartRateRequest) -> Result<HeartRateData> {
        require_child(child)?;
        let (guardian_id, _) = self.children.profile_for_child(child).await?;
        let sample = HeartRateData::new(request.timestamp.unwrap_or_else(Utc::now), request.heart_rate_bpm);
        self.store_heart_rate(&guardian_id, &child.user_id, sample).await
    }

    pub async fn record_gyroscope(&self, child: &User, request: RecordGyroscopeRequest) -> Result<GyroscopeData> {
        require_child(child)?;
        let (guardian_id, _) = self.children.profile_for_child(child).await?;
        let sample = GyroscopeData::new(
            request.timestamp.unwrap_or_else(Utc::now),
            GyroscopeValues {
                x: request.x,
                y: request.y,
                z: request.z,
            },
        );
        self.store_gyroscope(&guardian_id, &child.user_id, sample).await
    }

    /// Record a crisis episode; episodes at or above the child's threshold
    /// alert the guardian
    pub async fn record_meltdown(&self, child: &User, request: RecordMeltdownRequest) -> Result<MeltdownEvent> {
        require_child(child)?;
        if !(1..=10).contains(&request.severity) {
            return Err(GuardianError::Validation("severity must be between 1 and 10".to_string()));
        }
        let start_time = request.start_time.unwrap_or_else(Utc::now);
        if let Some(end) = request.end_time {
            if end < start_time {
                return Err(GuardianError::Validation("meltdown cannot end before it starts".to_string()));
            }
        }

        let (guardian_id, profile) = self.children.profile_for_child(child).await?;
        let mut event = MeltdownEvent {
            id: String::new(),
            child_id: child.user_id.clone(),
            start_time,
            end_time: request.end_time,
            duration_seconds: request.end_time.map(|end| (end - start_time).num_seconds()).unwrap_or(0),
            severity: request.severity,
            trigger: request.trigger.filter(|t| !t.trim().is_empty()),
            notes: request.notes.filter(|n| !n.trim().is_empty()),
        };
        event.id = self.telemetry.add_meltdown(&guardian_id, &event).await?;
        info!("Recorded meltdown {} for child {} (severity {})", event.id, child.user_id, event.severity);

        if event.severity >= profile.thresholds.meltdown_severity_threshold {
            let title = format!("Crisis Alert: {}", profile.name);
            let body = match &event.trigger {
                Some(trigger) => format!("Severity {} episode started, trigger: {}", event.severity, trigger),
                None => format!("Severity {} episode started", event.severity),
            };
            if let Err(e) = self.notifier.notify(NotificationChannel::GeofenceAlerts, &title, &body).await {
                error!("Failed to send crisis alert for child {}: {}", child.user_id, e);
            }
        }
        Ok(event)
    }

    /// Route a raw bracelet message by topic
    pub async fn process_bracelet_message(&self, message: &BraceletMessage) -> Result<BraceletOutcome> {
        debug!("Processing bracelet message on {}: {}", message.topic, message.payload);

        let payload: BraceletPayload = serde_json::from_str(&message.payload)
            .map_err(|e| GuardianError::Validation(format!("malformed bracelet payload: {}", e)))?;
        let child_id = payload
            .child_id
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| GuardianError::Validation("bracelet payload has no childId".to_string()))?;

        let topic = message.topic.to_lowercase();
        let kind = if topic.contains("location") {
            "location"
        } else if topic.contains("heart") {
            "heart"
        } else if topic.contains("gyro") {
            "gyro"
        } else {
            warn!("Unhandled bracelet topic: {}", message.topic);
            return Ok(BraceletOutcome::Ignored);
        };

        let child = self
            .users
            .get_user(&child_id)
            .await?
            .ok_or_else(|| GuardianError::NotFound(format!("child account {}", child_id)))?;
        let guardian_id = ChildService::guardian_of(&child)?;
        let timestamp = payload
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        match kind {
            "location" => {
                let (latitude, longitude) = match (payload.latitude, payload.longitude) {
                    (Some(lat), Some(lng)) => (lat, lng),
                    _ => return Err(GuardianError::Validation("location payload needs latitude and longitude".to_string())),
                };
                let location = self
                    .store_location(
                        &guardian_id,
                        &child_id,
                        GeoPoint::new(latitude, longitude),
                        payload.accuracy.unwrap_or(0.0),
                        payload.speed,
                        timestamp,
                    )
                    .await?;
                Ok(BraceletOutcome::Location(location))
            }
            "heart" => {
                let bpm = payload
                    .heart_rate
                    .ok_or_else(|| GuardianError::Validation("heart payload needs heartRate".to_string()))?;
                let sample = self
                    .store_heart_rate(&guardian_id, &child_id, HeartRateData::new(timestamp, bpm))
                    .await?;
                Ok(BraceletOutcome::HeartRate(sample))
            }
            _ => {
                let value = match (payload.x, payload.y, payload.z) {
                    (Some(x), Some(y), Some(z)) => GyroscopeValues { x, y, z },
                    _ => return Err(GuardianError::Validation("gyro payload needs x, y and z".to_string())),
                };
                let sample = self
                    .store_gyroscope(&guardian_id, &child_id, GyroscopeData::new(timestamp, value))
                    .await?;
                Ok(BraceletOutcome::Gyroscope(sample))
            }
        }
    }

    async fn store_location(
        &self,
        guardian_id: &str,
        child_id: &str,
        point: GeoPoint,
        accuracy: f32,
        speed: Option<f32>,
        timestamp: DateTime<Utc>,
    ) -> Result<ChildLocation> {
        if !point.is_valid() {
            return Err(GuardianError::Validation(format!(
                "invalid coordinates ({}, {})",
                point.latitude, point.longitude
            )));
        }
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(GuardianError::Validation("accuracy must be a non-negative number".to_string()));
        }

        let location = ChildLocation {
            child_id: child_id.to_string(),
            timestamp,
            geo_point: point,
            accuracy,
            speed: speed.filter(|s| s.is_finite()),
        };
        self.telemetry.add_location(guardian_id, &location).await?;
        debug!("Stored location for child {}", child_id);

        if let Err(e) = self.child_monitor.observe_location(child_id, point, timestamp).await {
            warn!("Child monitor did not evaluate location for {}: {}", child_id, e);
        }
        Ok(location)
    }

    async fn store_heart_rate(&self, guardian_id: &str, child_id: &str, sample: HeartRateData) -> Result<HeartRateData> {
        if !(MIN_HEART_RATE_BPM..=MAX_HEART_RATE_BPM).contains(&sample.heart_rate_bpm) {
            return Err(GuardianError::Validation(format!(
                "heart rate must be between {} and {} bpm",
                MIN_HEART_RATE_BPM, MAX_HEART_RATE_BPM
            )));
        }
        self.telemetry.add_heart_rate(guardian_id, child_id, &sample).await?;
        Ok(sample)
    }

    async fn store_gyroscope(&self, guardian_id: &str, child_id: &str, sample: GyroscopeData) -> Result<GyroscopeData> {
        let GyroscopeValues { x, y, z } = sample.value;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(GuardianError::Validation("gyroscope values must be finite".to_string()));
        }
        self.telemetry.add_gyroscope(guardian_id, child_id, &sample).await?;
        Ok(sample)
    }

    // Guardian-side reads

    pub async fn latest_location(&self, guardian: &User, child_id: &str) -> Result<Option<ChildLocation>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.telemetry.latest_location(&guardian.user_id, child_id).await?)
    }

    pub async fn locations(&self, guardian: &User, child_id: &str, window: TimeWindow) -> Result<Vec<ChildLocation>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.telemetry.locations_in(&guardian.user_id, child_id, window).await?)
    }

    pub async fn heart_rate(&self, guardian: &User, child_id: &str, window: TimeWindow) -> Result<Vec<HeartRateData>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.telemetry.heart_rate_in(&guardian.user_id, child_id, window).await?)
    }

    pub async fn gyroscope(&self, guardian: &User, child_id: &str, window: TimeWindow) -> Result<Vec<GyroscopeData>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.telemetry.gyroscope_in(&guardian.user_id, child_id, window).await?)
    }

    pub async fn meltdowns(&self, guardian: &User, child_id: &str, window: TimeWindow) -> Result<Vec<MeltdownEvent>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.telemetry.meltdowns_in(&guardian.user_id, child_id, window).await?)
    }

    pub async fn stream_latest_location(&self, guardian: &User, child_id: &str) -> Result<TypedSubscription<ChildLocation>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.telemetry.listen_latest_location(&guardian.user_id, child_id))
    }

    pub async fn stream_heart_rate(
        &self,
        guardian: &User,
        child_id: &str,
        window: TimeWindow,
    ) -> Result<TypedSubscription<HeartRateData>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.telemetry.listen_heart_rate(&guardian.user_id, child_id, window))
    }

    pub async fn stream_gyroscope(
        &self,
        guardian: &User,
        child_id: &str,
        window: TimeWindow,
    ) -> Result<TypedSubscription<GyroscopeData>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.telemetry.listen_gyroscope(&guardian.user_id, child_id, window))
    }

    pub async fn stream_meltdowns(
        &self,
        guardian: &User,
        child_id: &str,
        window: TimeWindow,
    ) -> Result<TypedSubscription<MeltdownEvent>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.telemetry.listen_meltdowns(&guardian.user_id, child_id, window))
    }

    /// Open the live latest-location query without an ownership check; used by
    /// the monitoring session after it has validated the selection
    pub fn listen_latest_location(&self, guardian_id: &str, child_id: &str) -> TypedSubscription<ChildLocation> {
        self.telemetry.listen_latest_location(guardian_id, child_id)
    }

    /// Delete samples older than `days` days
    pub async fn prune_older_than(&self, guardian: &User, child_id: &str, days: i64) -> Result<PruneResponse> {
        if days <= 0 {
            return Err(GuardianError::Validation("retention must be at least one day".to_string()));
        }
        self.children.owned_profile(guardian, child_id).await?;

        let cutoff = Duration::try_days(days)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| GuardianError::Validation(format!("retention of {} days is out of range", days)))?;
        let deleted = self.telemetry.delete_older_than(&guardian.user_id, child_id, cutoff).await?;
        info!("🧹 Pruned {} samples older than {} for child {}", deleted, cutoff, child_id);
        Ok(PruneResponse { deleted })
    }

    /// Heart-rate and gyroscope samples in the window as CSV, oldest first
    pub async fn export_bracelet_csv(&self, guardian: &User, child_id: &str, window: TimeWindow) -> Result<String> {
        let heart = self.heart_rate(guardian, child_id, window).await?;
        let gyro = self.gyroscope(guardian, child_id, window).await?;

        let mut rows: Vec<(DateTime<Utc>, [String; 5])> = Vec::with_capacity(heart.len() + gyro.len());
        for sample in heart {
            rows.push((
                sample.timestamp,
                [sample.data_type, sample.heart_rate_bpm.to_string(), String::new(), String::new(), String::new()],
            ));
        }
        for sample in gyro {
            rows.push((
                sample.timestamp,
                [
                    sample.data_type,
                    String::new(),
                    sample.value.x.to_string(),
                    sample.value.y.to_string(),
                    sample.value.z.to_string(),
                ],
            ));
        }
        rows.sort_by_key(|(timestamp, _)| *timestamp);

        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(["timestamp", "data_type", "heart_rate_bpm", "x", "y", "z"])
            .map_err(anyhow::Error::from)?;
        for (timestamp, fields) in &rows {
            let timestamp = timestamp.to_rfc3339();
            let record = std::iter::once(timestamp.as_str()).chain(fields.iter().map(String::as_str));
            wtr.write_record(record).map_err(anyhow::Error::from)?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| GuardianError::Other(anyhow::anyhow!("failed to flush CSV: {}", e)))?;

        info!("Exported {} bracelet samples for child {}", rows.len(), child_id);
        String::from_utf8(bytes).map_err(|e| GuardianError::Other(anyhow::anyhow!("CSV is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seed_associated, RecordingMonitor, RecordingNotifier, TestStore};
    use shared::ChildThresholds;

    struct Fixture {
        service: TelemetryService,
        store: TestStore,
        monitor: Arc<RecordingMonitor>,
        notifier: Arc<RecordingNotifier>,
        guardian: User,
        child: User,
    }

    async fn setup() -> Fixture {
        let store = TestStore::sqlite().await;
        let (guardian, child) = seed_associated(&store).await;
        let monitor = Arc::new(RecordingMonitor::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = TelemetryService::new(
            store.child_service(),
            store.users.clone(),
            store.telemetry.clone(),
            monitor.clone(),
            notifier.clone(),
        );
        Fixture {
            service,
            store,
            monitor,
            notifier,
            guardian,
            child,
        }
    }

    fn meltdown(severity: u8) -> RecordMeltdownRequest {
        RecordMeltdownRequest {
            start_time: None,
            end_time: None,
            severity,
            trigger: Some("noise".to_string()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_location_is_stored_and_fed_to_monitor() {
        let f = setup().await;
        let request = RecordLocationRequest {
            latitude: 40.0,
            longitude: -3.0,
            accuracy: 8.5,
            speed: None,
            timestamp: None,
        };

        f.service.record_location(&f.child, request).await.unwrap();

        let latest = f.service.latest_location(&f.guardian, &f.child.user_id).await.unwrap().unwrap();
        assert_eq!(latest.geo_point, GeoPoint::new(40.0, -3.0));
        assert_eq!(f.monitor.observed(), vec![(f.child.user_id.clone(), GeoPoint::new(40.0, -3.0))]);
    }

    #[tokio::test]
    async fn test_invalid_samples_rejected() {
        let f = setup().await;
        let bad_location = RecordLocationRequest {
            latitude: 95.0,
            longitude: 0.0,
            accuracy: 1.0,
            speed: None,
            timestamp: None,
        };
        assert!(matches!(
            f.service.record_location(&f.child, bad_location).await,
            Err(GuardianError::Validation(_))
        ));

        for bpm in [0, 301] {
            let request = RecordHeartRateRequest {
                heart_rate_bpm: bpm,
                timestamp: None,
            };
            assert!(matches!(
                f.service.record_heart_rate(&f.child, request).await,
                Err(GuardianError::Validation(_))
            ));
        }
        assert!(matches!(
            f.service.record_meltdown(&f.child, meltdown(0)).await,
            Err(GuardianError::Validation(_))
        ));
        assert!(f.monitor.observed().is_empty());
    }

    #[tokio::test]
    async fn test_guardian_cannot_record_samples() {
        let f = setup().await;
        let request = RecordHeartRateRequest {
            heart_rate_bpm: 90,
            timestamp: None,
        };
        assert!(matches!(
            f.service.record_heart_rate(&f.guardian, request).await,
            Err(GuardianError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_meltdown_alert_respects_threshold() {
        let f = setup().await;
        f.store
            .child_service()
            .update_thresholds(
                &f.guardian,
                &f.child.user_id,
                ChildThresholds {
                    meltdown_severity_threshold: 7,
                    ..ChildThresholds::default()
                },
            )
            .await
            .unwrap();

        f.service.record_meltdown(&f.child, meltdown(4)).await.unwrap();
        assert!(f.notifier.sent().is_empty());

        let event = f.service.record_meltdown(&f.child, meltdown(7)).await.unwrap();
        assert!(!event.id.is_empty());
        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Crisis Alert: Leo");

        let stored = f
            .service
            .meltdowns(&f.guardian, &f.child.user_id, TimeWindow::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_bracelet_messages_are_routed_by_topic() {
        let f = setup().await;
        let message = |topic: &str, payload: String| BraceletMessage {
            topic: topic.to_string(),
            payload,
        };
        let child_id = f.child.user_id.clone();

        let heart = f
            .service
            .process_bracelet_message(&message(
                "bracelet/heart",
                format!(r#"{{"childId":"{}","heartRate":97,"timestamp":1714550400000}}"#, child_id),
            ))
            .await
            .unwrap();
        match heart {
            BraceletOutcome::HeartRate(sample) => {
                assert_eq!(sample.heart_rate_bpm, 97);
                assert_eq!(sample.timestamp.timestamp_millis(), 1_714_550_400_000);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let gyro = f
            .service
            .process_bracelet_message(&message(
                "bracelet/gyro",
                format!(r#"{{"childId":"{}","x":0.5,"y":-0.25,"z":1.0}}"#, child_id),
            ))
            .await
            .unwrap();
        assert!(matches!(gyro, BraceletOutcome::Gyroscope(_)));

        let location = f
            .service
            .process_bracelet_message(&message(
                "bracelet/location",
                format!(r#"{{"childId":"{}","latitude":40.1,"longitude":-3.1}}"#, child_id),
            ))
            .await
            .unwrap();
        assert!(matches!(location, BraceletOutcome::Location(_)));

        let ignored = f
            .service
            .process_bracelet_message(&message("bracelet/battery", format!(r#"{{"childId":"{}"}}"#, child_id)))
            .await
            .unwrap();
        assert_eq!(ignored, BraceletOutcome::Ignored);

        let window = TimeWindow::default();
        assert_eq!(f.service.heart_rate(&f.guardian, &child_id, window).await.unwrap().len(), 1);
        assert_eq!(f.service.gyroscope(&f.guardian, &child_id, window).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bracelet_payload_errors() {
        let f = setup().await;
        let not_json = BraceletMessage {
            topic: "heart".to_string(),
            payload: "bpm=90".to_string(),
        };
        assert!(matches!(
            f.service.process_bracelet_message(&not_json).await,
            Err(GuardianError::Validation(_))
        ));

        let unknown_child = BraceletMessage {
            topic: "heart".to_string(),
            payload: r#"{"childId":"nobody","heartRate":90}"#.to_string(),
        };
        assert!(matches!(
            f.service.process_bracelet_message(&unknown_child).await,
            Err(GuardianError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_prune_and_export() {
        let f = setup().await;
        let now = Utc::now();
        for (age_days, bpm) in [(45, 70), (1, 80)] {
            let request = RecordHeartRateRequest {
                heart_rate_bpm: bpm,
                timestamp: Some(now - Duration::days(age_days)),
            };
            f.service.record_heart_rate(&f.child, request).await.unwrap();
        }
        let gyro = RecordGyroscopeRequest {
            x: 0.5,
            y: 0.0,
            z: -1.5,
            timestamp: Some(now),
        };
        f.service.record_gyroscope(&f.child, gyro).await.unwrap();

        let pruned = f.service.prune_older_than(&f.guardian, &f.child.user_id, 30).await.unwrap();
        assert_eq!(pruned.deleted, 1);

        let csv = f
            .service
            .export_bracelet_csv(&f.guardian, &f.child.user_id, TimeWindow::default())
            .await
            .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,data_type,heart_rate_bpm,x,y,z");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(",heartRate,80,,,"));
        assert!(lines[2].ends_with(",gyroscope,,0.5,0,-1.5"));
    }

    #[tokio::test]
    async fn test_prune_rejects_unrepresentable_retention() {
        let f = setup().await;
        let request = RecordHeartRateRequest {
            heart_rate_bpm: 75,
            timestamp: Some(Utc::now() - Duration::days(400)),
        };
        f.service.record_heart_rate(&f.child, request).await.unwrap();

        for days in [i64::MAX, 10_000_000_000_000, 200_000_000] {
            let result = f.service.prune_older_than(&f.guardian, &f.child.user_id, days).await;
            assert!(matches!(result, Err(GuardianError::Validation(_))), "days = {}", days);
        }

        let heart = f
            .service
            .heart_rate(&f.guardian, &f.child.user_id, TimeWindow::default())
            .await
            .unwrap();
        assert_eq!(heart.len(), 1);
    }
}
