use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Account role. A guardian monitors children; a child reports telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guardian,
    Child,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Guardian => write!(f, "guardian"),
            Role::Child => write!(f, "child"),
        }
    }
}

/// Account profile stored at `users/{user_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub name: Option<String>,
    /// Child ids associated with a guardian (empty for children)
    #[serde(default)]
    pub associated_children: Vec<String>,
    /// Guardian owning this child account (None for guardians)
    #[serde(default)]
    pub guardian_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-child alert configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildThresholds {
    /// Meltdowns at or above this severity raise an alert (1-10)
    pub meltdown_severity_threshold: u8,
    pub alert_vibration_pattern: String,
    pub alert_sound: String,
}

impl Default for ChildThresholds {
    fn default() -> Self {
        Self {
            meltdown_severity_threshold: 5,
            alert_vibration_pattern: "default".to_string(),
            alert_sound: "default".to_string(),
        }
    }
}

/// Child profile stored under `users/{guardian_id}/children_profiles/{child_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildProfile {
    /// Equal to the child's account id
    pub child_id: String,
    pub name: String,
    pub dob: Option<NaiveDate>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub thresholds: ChildThresholds,
}

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Haversine distance to `other` in meters
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_METERS * c
    }

    /// Whether both components are finite and inside WGS84 bounds
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Guardian-defined circular region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceArea {
    pub id: String,
    pub child_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Radius in meters
    pub radius: f64,
    pub creation_time: DateTime<Utc>,
}

impl GeofenceArea {
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Location sample uploaded by the child's device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildLocation {
    pub child_id: String,
    pub timestamp: DateTime<Utc>,
    pub geo_point: GeoPoint,
    pub accuracy: f32,
    pub speed: Option<f32>,
}

pub const TYPE_HEART_RATE: &str = "heartRate";
pub const TYPE_GYROSCOPE: &str = "gyroscope";

/// Heart-rate sample from the bracelet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateData {
    pub timestamp: DateTime<Utc>,
    pub heart_rate_bpm: u32,
    pub data_type: String,
}

impl HeartRateData {
    pub fn new(timestamp: DateTime<Utc>, heart_rate_bpm: u32) -> Self {
        Self {
            timestamp,
            heart_rate_bpm,
            data_type: TYPE_HEART_RATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GyroscopeValues {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Gyroscope sample from the bracelet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GyroscopeData {
    pub timestamp: DateTime<Utc>,
    pub value: GyroscopeValues,
    pub data_type: String,
}

impl GyroscopeData {
    pub fn new(timestamp: DateTime<Utc>, value: GyroscopeValues) -> Self {
        Self {
            timestamp,
            value,
            data_type: TYPE_GYROSCOPE.to_string(),
        }
    }
}

/// A logged crisis episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeltdownEvent {
    /// Document id, filled in when read back from the store
    #[serde(default)]
    pub id: String,
    pub child_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    /// Severity on a 1-10 scale
    pub severity: u8,
    pub trigger: Option<String>,
    pub notes: Option<String>,
}

/// Saved chart/report reference stored under `users/{guardian_id}/user_graphs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserGraph {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub child_id: String,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub image_url: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Classified geofence transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Entered,
    Exited,
    Dwelling,
}

impl TransitionKind {
    pub const ENTER_CODE: i32 = 1;
    pub const EXIT_CODE: i32 = 2;
    pub const DWELL_CODE: i32 = 4;

    /// Map a raw platform transition code; unknown codes yield None
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            Self::ENTER_CODE => Some(TransitionKind::Entered),
            Self::EXIT_CODE => Some(TransitionKind::Exited),
            Self::DWELL_CODE => Some(TransitionKind::Dwelling),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            TransitionKind::Entered => Self::ENTER_CODE,
            TransitionKind::Exited => Self::EXIT_CODE,
            TransitionKind::Dwelling => Self::DWELL_CODE,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Entered => write!(f, "entered"),
            TransitionKind::Exited => write!(f, "exited"),
            TransitionKind::Dwelling => write!(f, "dwelling"),
        }
    }
}

/// Transition callback raised by a geofence monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceTransitionEvent {
    /// Ids of every region that triggered together
    pub region_ids: Vec<String>,
    /// Raw transition code (1 = enter, 2 = exit, 4 = dwell)
    pub transition: i32,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub child_id: Option<String>,
    /// Set when the platform reports an error instead of a transition
    #[serde(default)]
    pub error_code: Option<i32>,
}

/// Event-log entry appended for every processed transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceTransitionRecord {
    pub geofence_id: String,
    pub child_id: Option<String>,
    pub transition_type: TransitionKind,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Notification channel ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Geofence crossings and crisis alerts
    GeofenceAlerts,
    /// Background location and data-sync status
    LocationTracking,
}

impl NotificationChannel {
    pub fn channel_id(&self) -> &'static str {
        match self {
            NotificationChannel::GeofenceAlerts => "geofence_alerts_channel",
            NotificationChannel::LocationTracking => "location_tracking_channel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: NotificationChannel,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Request / response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociateChildRequest {
    pub child_id: String,
    pub name: String,
    pub dob: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateChildRequest {
    pub name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildResponse {
    pub child: ChildProfile,
    pub success_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildListResponse {
    pub children: Vec<ChildProfile>,
}

/// Numeric form input that may arrive as a JSON number or as text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

impl NumericInput {
    /// Parse into a finite f64
    pub fn parse(&self) -> Option<f64> {
        let value = match self {
            NumericInput::Number(n) => *n,
            NumericInput::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for NumericInput {
    fn from(value: f64) -> Self {
        NumericInput::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGeofenceRequest {
    pub name: String,
    pub latitude: NumericInput,
    pub longitude: NumericInput,
    pub radius: NumericInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceListResponse {
    pub geofences: Vec<GeofenceArea>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f32,
    pub speed: Option<f32>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordHeartRateRequest {
    pub heart_rate_bpm: u32,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordGyroscopeRequest {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeltdownRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub severity: u8,
    pub trigger: Option<String>,
    pub notes: Option<String>,
}

/// Raw bracelet/broker message: a topic plus its JSON payload text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BraceletMessage {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindowQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub child_id: String,
    pub analysis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateUserGraphRequest {
    pub child_id: String,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectChildRequest {
    pub child_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruneResponse {
    pub deleted: usize,
}

/// Type of calendar day for explicit rendering logic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CalendarDayType {
    /// Empty padding day before the start of the month
    PaddingBefore,
    /// Actual day within the month
    MonthDay,
}

/// A single calendar day with the episodes that started on it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeCalendarDay {
    pub day: u32,
    pub day_type: CalendarDayType,
    pub episodes: Vec<MeltdownEvent>,
}

/// Calendar month of meltdown episodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeCalendarMonth {
    pub month: u32,
    pub year: u32,
    pub days: Vec<EpisodeCalendarDay>,
    /// 0 = Sunday, 1 = Monday, etc.
    pub first_day_of_week: u32,
}
