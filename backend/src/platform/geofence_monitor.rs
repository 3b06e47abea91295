//! # Geofence Monitor
//!
//! The platform geofencing service keeps a set of circular regions and raises
//! transition callbacks when a device crosses one of them. [`GeofenceMonitor`]
//! is the seam the domain layer talks to; [`LocalGeofenceMonitor`] is an
//! in-process implementation that evaluates reported locations with haversine
//! distance and publishes [`GeofenceTransitionEvent`]s on a channel.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared::{GeoPoint, GeofenceArea, GeofenceTransitionEvent, TransitionKind};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Platform status codes reported alongside failed transitions
pub const GEOFENCE_NOT_AVAILABLE: i32 = 1000;
pub const GEOFENCE_TOO_MANY_GEOFENCES: i32 = 1001;
pub const GEOFENCE_TOO_MANY_PENDING_INTENTS: i32 = 1002;
pub const RESOLUTION_REQUIRED: i32 = 6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitorError {
    #[error("geofence service is not available")]
    NotAvailable,

    #[error("too many geofences registered (limit {0})")]
    TooManyGeofences(usize),

    #[error("too many pending geofence requests")]
    TooManyPendingIntents,

    #[error("geofence request is too fine-grained")]
    RequestTooFine,

    #[error("location permission not granted")]
    PermissionDenied,

    #[error("invalid region {id}: {reason}")]
    InvalidRegion { id: String, reason: String },

    #[error("geofence error code {0}")]
    Unknown(i32),
}

impl MonitorError {
    /// Map a raw platform status code
    pub fn from_status_code(code: i32) -> Self {
        match code {
            GEOFENCE_NOT_AVAILABLE => MonitorError::NotAvailable,
            GEOFENCE_TOO_MANY_GEOFENCES => MonitorError::TooManyGeofences(0),
            GEOFENCE_TOO_MANY_PENDING_INTENTS => MonitorError::TooManyPendingIntents,
            RESOLUTION_REQUIRED => MonitorError::RequestTooFine,
            other => MonitorError::Unknown(other),
        }
    }

    /// User-facing text for an error notification
    pub fn describe(&self) -> &'static str {
        match self {
            MonitorError::NotAvailable => "Geofence service is not available now",
            MonitorError::TooManyGeofences(_) => "Your app has registered too many geofences",
            MonitorError::TooManyPendingIntents => "You have provided too many pending intents to the addGeofences() call",
            MonitorError::RequestTooFine => "Geofence request is too fine-grained; resolution required",
            MonitorError::PermissionDenied => "Location permission has not been granted",
            MonitorError::InvalidRegion { .. } => "Geofence region is invalid",
            MonitorError::Unknown(_) => "Unknown geofence error",
        }
    }
}

/// Bit set of transitions a region reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMask(u8);

impl TransitionMask {
    pub const ENTER: TransitionMask = TransitionMask(1);
    pub const EXIT: TransitionMask = TransitionMask(2);
    pub const DWELL: TransitionMask = TransitionMask(4);

    pub fn union(self, other: TransitionMask) -> TransitionMask {
        TransitionMask(self.0 | other.0)
    }

    pub fn contains(&self, kind: TransitionKind) -> bool {
        (self.0 as i32) & kind.code() != 0
    }
}

impl Default for TransitionMask {
    fn default() -> Self {
        TransitionMask::ENTER.union(TransitionMask::EXIT)
    }
}

/// A circle registered with a monitor
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredRegion {
    pub id: String,
    /// Child whose locations are evaluated against this region; None matches any
    pub child_id: Option<String>,
    pub center: GeoPoint,
    pub radius_meters: f64,
    pub mask: TransitionMask,
    /// Fire an enter transition when the first observed location is already inside
    pub initial_trigger_enter: bool,
}

impl MonitoredRegion {
    pub fn from_area(area: &GeofenceArea, mask: TransitionMask) -> Self {
        Self {
            id: area.id.clone(),
            child_id: Some(area.child_id.clone()),
            center: area.center(),
            radius_meters: area.radius,
            mask,
            initial_trigger_enter: true,
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_meters(point) <= self.radius_meters
    }
}

#[async_trait]
pub trait GeofenceMonitor: Send + Sync {
    /// Add or replace regions. An empty slice is a no-op.
    async fn register(&self, regions: &[MonitoredRegion]) -> Result<(), MonitorError>;

    /// Remove regions by id. Unknown ids are ignored.
    async fn unregister(&self, ids: &[String]) -> Result<(), MonitorError>;

    /// Ids currently registered, sorted
    fn registered_ids(&self) -> Vec<String>;

    /// Feed a device location; monitors that receive fixes from elsewhere ignore it
    async fn observe_location(&self, _child_id: &str, _point: GeoPoint, _at: DateTime<Utc>) -> Result<(), MonitorError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Presence {
    Unknown,
    Outside,
    Inside { since: DateTime<Utc>, dwell_fired: bool },
}

#[derive(Debug, Clone)]
struct RegionState {
    region: MonitoredRegion,
    presence: Presence,
}

/// In-process geofence monitor
pub struct LocalGeofenceMonitor {
    name: String,
    max_regions: usize,
    dwell_delay: Duration,
    permission_granted: AtomicBool,
    regions: Mutex<BTreeMap<String, RegionState>>,
    events: mpsc::UnboundedSender<GeofenceTransitionEvent>,
}

impl LocalGeofenceMonitor {
    pub fn new(
        name: &str,
        max_regions: usize,
        dwell_delay: Duration,
        permission_granted: bool,
        events: mpsc::UnboundedSender<GeofenceTransitionEvent>,
    ) -> Self {
        Self {
            name: name.to_string(),
            max_regions,
            dwell_delay,
            permission_granted: AtomicBool::new(permission_granted),
            regions: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    fn validate(region: &MonitoredRegion) -> Result<(), MonitorError> {
        if !region.center.is_valid() {
            return Err(MonitorError::InvalidRegion {
                id: region.id.clone(),
                reason: "center is outside valid coordinates".to_string(),
            });
        }
        if !region.radius_meters.is_finite() || region.radius_meters <= 0.0 {
            return Err(MonitorError::InvalidRegion {
                id: region.id.clone(),
                reason: "radius must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Advance region states for one location fix and collect transitions
    fn evaluate(&self, child_id: &str, point: &GeoPoint, at: DateTime<Utc>) -> Vec<(TransitionKind, String)> {
        let mut transitions = Vec::new();
        let mut regions = match self.regions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        for (id, state) in regions.iter_mut() {
            if state.region.child_id.as_deref().is_some_and(|c| c != child_id) {
                continue;
            }
            let inside = state.region.contains(point);
            let mask = state.region.mask;

            let (next, fired) = match (state.presence, inside) {
                (Presence::Unknown, true) => {
                    let fire = state.region.initial_trigger_enter && mask.contains(TransitionKind::Entered);
                    (Presence::Inside { since: at, dwell_fired: false }, fire.then_some(TransitionKind::Entered))
                }
                (Presence::Unknown, false) => (Presence::Outside, None),
                (Presence::Outside, true) => (
                    Presence::Inside { since: at, dwell_fired: false },
                    mask.contains(TransitionKind::Entered).then_some(TransitionKind::Entered),
                ),
                (Presence::Outside, false) => (Presence::Outside, None),
                (Presence::Inside { .. }, false) => {
                    (Presence::Outside, mask.contains(TransitionKind::Exited).then_some(TransitionKind::Exited))
                }
                (Presence::Inside { since, dwell_fired }, true) => {
                    if !dwell_fired && mask.contains(TransitionKind::Dwelling) && at - since >= self.dwell_delay {
                        (Presence::Inside { since, dwell_fired: true }, Some(TransitionKind::Dwelling))
                    } else {
                        (Presence::Inside { since, dwell_fired }, None)
                    }
                }
            };

            state.presence = next;
            if let Some(kind) = fired {
                transitions.push((kind, id.clone()));
            }
        }
        transitions
    }
}

#[async_trait]
impl GeofenceMonitor for LocalGeofenceMonitor {
    async fn register(&self, regions: &[MonitoredRegion]) -> Result<(), MonitorError> {
        if regions.is_empty() {
            return Ok(());
        }
        if !self.permission_granted.load(Ordering::SeqCst) {
            warn!("{} monitor: location permission not granted", self.name);
            return Err(MonitorError::PermissionDenied);
        }
        for region in regions {
            Self::validate(region)?;
        }

        let mut current = match self.regions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let added = regions.iter().filter(|r| !current.contains_key(&r.id)).count();
        if current.len() + added > self.max_regions {
            warn!(
                "{} monitor: registering {} regions would exceed the limit of {}",
                self.name,
                regions.len(),
                self.max_regions
            );
            return Err(MonitorError::TooManyGeofences(self.max_regions));
        }

        for region in regions {
            // Re-registering resets presence so the initial trigger applies again
            current.insert(
                region.id.clone(),
                RegionState {
                    region: region.clone(),
                    presence: Presence::Unknown,
                },
            );
        }
        info!("{} monitor: registered {} regions ({} total)", self.name, regions.len(), current.len());
        Ok(())
    }

    async fn unregister(&self, ids: &[String]) -> Result<(), MonitorError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut current = match self.regions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = current.len();
        for id in ids {
            current.remove(id);
        }
        info!("{} monitor: removed {} regions", self.name, before - current.len());
        Ok(())
    }

    fn registered_ids(&self) -> Vec<String> {
        match self.regions.lock() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        }
    }

    async fn observe_location(&self, child_id: &str, point: GeoPoint, at: DateTime<Utc>) -> Result<(), MonitorError> {
        if !self.permission_granted.load(Ordering::SeqCst) {
            return Err(MonitorError::PermissionDenied);
        }

        let transitions = self.evaluate(child_id, &point, at);
        if transitions.is_empty() {
            return Ok(());
        }

        // Regions crossed by the same fix in the same direction travel together
        for kind in [TransitionKind::Entered, TransitionKind::Exited, TransitionKind::Dwelling] {
            let region_ids: Vec<String> = transitions
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, id)| id.clone())
                .collect();
            if region_ids.is_empty() {
                continue;
            }
            debug!("{} monitor: child {} {} {:?}", self.name, child_id, kind, region_ids);
            let event = GeofenceTransitionEvent {
                region_ids,
                transition: kind.code(),
                location: Some(point),
                child_id: Some(child_id.to_string()),
                error_code: None,
            };
            if self.events.send(event).is_err() {
                warn!("{} monitor: transition handler is gone, dropping event", self.name);
                return Err(MonitorError::NotAvailable);
            }
        }
        Ok(())
    }
}
