//! Geofence registry operations.
//!
//! Documents are the source of truth. After each successful write the change
//! is mirrored into the child-device monitor; a mirroring failure is logged
//! and never rolls back the document.

use chrono::Utc;
use shared::{CreateGeofenceRequest, GeoPoint, GeofenceArea, GeofenceListResponse, User};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::child_service::ChildService;
use crate::domain::errors::{GeofenceValidationError, GuardianError, Result};
use crate::platform::{GeofenceMonitor, MonitoredRegion, TransitionMask};
use crate::storage::repositories::GeofenceRepository;
use crate::storage::TypedSubscription;

/// A geofence form that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedGeofence {
    pub name: String,
    pub center: GeoPoint,
    pub radius: f64,
}

/// Check a geofence form without touching any store
pub fn validate_geofence(request: &CreateGeofenceRequest) -> std::result::Result<ValidatedGeofence, GeofenceValidationError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(GeofenceValidationError::MissingName);
    }

    let latitude = request
        .latitude
        .parse()
        .ok_or(GeofenceValidationError::NotNumeric { field: "latitude" })?;
    let longitude = request
        .longitude
        .parse()
        .ok_or(GeofenceValidationError::NotNumeric { field: "longitude" })?;
    let radius = request
        .radius
        .parse()
        .ok_or(GeofenceValidationError::NotNumeric { field: "radius" })?;

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(GeofenceValidationError::LatitudeOutOfRange);
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(GeofenceValidationError::LongitudeOutOfRange);
    }
    if radius <= 0.0 {
        return Err(GeofenceValidationError::NonPositiveRadius);
    }

    Ok(ValidatedGeofence {
        name: name.to_string(),
        center: GeoPoint::new(latitude, longitude),
        radius,
    })
}

#[derive(Clone)]
pub struct GeofenceService {
    children: ChildService,
    geofences: GeofenceRepository,
    child_monitor: Arc<dyn GeofenceMonitor>,
    mask: TransitionMask,
}

impl GeofenceService {
    pub fn new(
        children: ChildService,
        geofences: GeofenceRepository,
        child_monitor: Arc<dyn GeofenceMonitor>,
        mask: TransitionMask,
    ) -> Self {
        Self {
            children,
            geofences,
            child_monitor,
            mask,
        }
    }

    pub async fn create_geofence(
        &self,
        guardian: &User,
        child_id: &str,
        request: CreateGeofenceRequest,
    ) -> Result<GeofenceArea> {
        info!("Creating geofence {:?} for child {}", request.name, child_id);

        let valid = validate_geofence(&request).map_err(|e| {
            warn!("Rejected geofence for child {}: {}", child_id, e);
            GuardianError::from(e)
        })?;
        self.children.owned_profile(guardian, child_id).await?;

        let area = GeofenceArea {
            id: GeofenceArea::generate_id(),
            child_id: child_id.to_string(),
            name: valid.name,
            latitude: valid.center.latitude,
            longitude: valid.center.longitude,
            radius: valid.radius,
            creation_time: Utc::now(),
        };
        self.geofences.store_geofence(&guardian.user_id, &area).await?;
        info!("Stored geofence {} ({})", area.id, area.name);

        let region = MonitoredRegion::from_area(&area, self.mask);
        if let Err(e) = self.child_monitor.register(&[region]).await {
            error!("Geofence {} saved but not added to the child monitor: {}", area.id, e);
        }

        Ok(area)
    }

    pub async fn delete_geofence(&self, guardian: &User, child_id: &str, geofence_id: &str) -> Result<()> {
        info!("Deleting geofence {} for child {}", geofence_id, child_id);
        self.children.owned_profile(guardian, child_id).await?;

        if !self.geofences.delete_geofence(&guardian.user_id, child_id, geofence_id).await? {
            return Err(GuardianError::NotFound(format!("geofence {}", geofence_id)));
        }

        if let Err(e) = self.child_monitor.unregister(&[geofence_id.to_string()]).await {
            error!("Geofence {} deleted but still in the child monitor: {}", geofence_id, e);
        }
        Ok(())
    }

    /// Dissociate a child and drop its regions from the child monitor, so a
    /// later guardian never receives transitions for these geofences
    pub async fn dissociate_child(&self, guardian: &User, child_id: &str) -> Result<()> {
        let stale: Vec<String> = self
            .geofences
            .list_geofences(&guardian.user_id, child_id)
            .await?
            .into_iter()
            .map(|area| area.id)
            .collect();

        self.children.dissociate_child(guardian, child_id).await?;

        if !stale.is_empty() {
            info!("Removing {} geofences of child {} from the child monitor", stale.len(), child_id);
            if let Err(e) = self.child_monitor.unregister(&stale).await {
                error!("Child {} dissociated but its geofences are still monitored: {}", child_id, e);
            }
        }
        Ok(())
    }

    /// Register every stored geofence with the child monitor; run once at
    /// startup since the in-process monitor starts empty. Returns the number
    /// of regions registered.
    pub async fn restore_child_monitor(&self) -> Result<usize> {
        let mut restored = 0;
        for (guardian_id, profile) in self.children.associations().await? {
            let regions: Vec<MonitoredRegion> = self
                .geofences
                .list_geofences(&guardian_id, &profile.child_id)
                .await?
                .iter()
                .map(|area| MonitoredRegion::from_area(area, self.mask))
                .collect();
            if regions.is_empty() {
                continue;
            }
            match self.child_monitor.register(&regions).await {
                Ok(()) => restored += regions.len(),
                Err(e) => error!("Could not restore {} geofences for child {}: {}", regions.len(), profile.child_id, e),
            }
        }
        info!("Restored {} geofences into the child monitor", restored);
        Ok(restored)
    }

    pub async fn list_geofences(&self, guardian: &User, child_id: &str) -> Result<GeofenceListResponse> {
        self.children.owned_profile(guardian, child_id).await?;
        let geofences = self.geofences.list_geofences(&guardian.user_id, child_id).await?;
        info!("Found {} geofences for child {}", geofences.len(), child_id);
        Ok(GeofenceListResponse { geofences })
    }

    pub async fn stream_geofences(&self, guardian: &User, child_id: &str) -> Result<TypedSubscription<GeofenceArea>> {
        self.children.owned_profile(guardian, child_id).await?;
        Ok(self.geofences.listen_geofences(&guardian.user_id, child_id))
    }

    /// Open the live list without re-checking ownership; used by the monitoring
    /// session after it has validated the selection
    pub fn listen_geofences(&self, guardian_id: &str, child_id: &str) -> TypedSubscription<GeofenceArea> {
        self.geofences.listen_geofences(guardian_id, child_id)
    }
}
