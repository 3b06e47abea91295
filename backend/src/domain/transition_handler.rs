//! Geofence transition pipeline: classify, record, notify.
//!
//! Each triggering region is processed on its own. A failed record write or
//! notification is logged and the remaining regions still go through.

use chrono::Utc;
use shared::{GeofenceTransitionEvent, GeofenceTransitionRecord, NotificationChannel, TransitionKind};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::errors::Result;
use crate::platform::{MonitorError, Notifier};
use crate::storage::repositories::TransitionRepository;

pub const ERROR_TITLE: &str = "Geofence Error";

#[derive(Clone)]
pub struct TransitionHandler {
    transitions: TransitionRepository,
    notifier: Arc<dyn Notifier>,
}

impl TransitionHandler {
    pub fn new(transitions: TransitionRepository, notifier: Arc<dyn Notifier>) -> Self {
        Self { transitions, notifier }
    }

    /// Process one event and return a description per handled region
    pub async fn handle(&self, event: &GeofenceTransitionEvent) -> Vec<String> {
        if let Some(code) = event.error_code {
            let monitor_error = MonitorError::from_status_code(code);
            error!("Geofence error {}: {}", code, monitor_error.describe());
            if let Err(e) = self
                .notifier
                .notify(NotificationChannel::GeofenceAlerts, ERROR_TITLE, monitor_error.describe())
                .await
            {
                error!("Failed to dispatch geofence error notification: {}", e);
            }
            return Vec::new();
        }

        let Some(kind) = TransitionKind::from_code(event.transition) else {
            warn!("Unrecognized geofence transition type: {}", event.transition);
            return Vec::new();
        };
        let Some(location) = event.location else {
            warn!("Triggering location was missing, cannot process {} transition", kind);
            return Vec::new();
        };
        if event.region_ids.is_empty() {
            warn!("Triggering geofence list is empty");
            return Vec::new();
        }

        let mut descriptions = Vec::with_capacity(event.region_ids.len());
        for region_id in &event.region_ids {
            let description = format!("Child {} geofence: {}", kind, region_id);
            info!("{}", description);

            let record = GeofenceTransitionRecord {
                geofence_id: region_id.clone(),
                child_id: event.child_id.clone(),
                transition_type: kind,
                timestamp: Utc::now(),
                latitude: location.latitude,
                longitude: location.longitude,
            };
            if let Err(e) = self.transitions.append(&record).await {
                error!("Failed to record transition for geofence {}: {}", region_id, e);
            }

            let title = format!("Geofence Alert: {}", region_id);
            let body = format!("The child has {} the safe zone.", kind);
            if let Err(e) = self
                .notifier
                .notify(NotificationChannel::GeofenceAlerts, &title, &body)
                .await
            {
                error!("Failed to notify transition for geofence {}: {}", region_id, e);
            }

            descriptions.push(description);
        }
        descriptions
    }

    /// Recorded transitions for the given children, newest first
    pub async fn history(&self, child_ids: &[String], limit: usize) -> Result<Vec<GeofenceTransitionRecord>> {
        Ok(self.transitions.list_for_children(child_ids, limit).await?)
    }

    /// Consume monitor events until the channel closes or `token` is cancelled
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<GeofenceTransitionEvent>, token: CancellationToken) {
        info!("Geofence transition handler started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle(&event).await;
                    }
                    None => break,
                },
            }
        }
        info!("Geofence transition handler stopped");
    }
}
