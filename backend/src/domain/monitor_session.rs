//! # Guardian Monitoring Session
//!
//! A guardian watches one child at a time. Selecting a child opens live
//! queries for its latest location and its geofence list and publishes them
//! through a `watch` cell; the geofence list is also mirrored into the
//! guardian-device monitor.
//!
//! Every selection bumps a generation counter and gets its own
//! [`CancellationToken`]. Background tasks only write into the cell while the
//! generation they were started with is still current, so nothing from the
//! previous child is visible once a new child has been selected.

use serde::Serialize;
use shared::{ChildLocation, GeofenceArea, User};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::auth_service::require_guardian;
use crate::domain::child_service::ChildService;
use crate::domain::errors::Result;
use crate::domain::geofence_service::GeofenceService;
use crate::domain::geofence_sync::{GeofenceRegistrySync, SyncStrategy};
use crate::domain::telemetry_service::TelemetryService;
use crate::platform::{GeofenceMonitor, TransitionMask};
use crate::storage::TypedSubscription;

/// Current view of a monitoring session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub child_id: Option<String>,
    pub latest_location: Option<ChildLocation>,
    pub geofences: Vec<GeofenceArea>,
    pub last_error: Option<String>,
}

/// Collaborators shared by every session
#[derive(Clone)]
pub struct SessionDeps {
    pub children: ChildService,
    pub geofences: GeofenceService,
    pub telemetry: TelemetryService,
    pub guardian_monitor: Arc<dyn GeofenceMonitor>,
    pub strategy: SyncStrategy,
    pub mask: TransitionMask,
}

pub struct MonitorSession {
    guardian: User,
    deps: SessionDeps,
    state: Arc<watch::Sender<SessionSnapshot>>,
    current: Mutex<Option<CancellationToken>>,
}

impl MonitorSession {
    pub fn new(guardian: User, deps: SessionDeps) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            guardian,
            deps,
            state: Arc::new(state),
            current: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Switch the session to `child_id`, returning the new generation
    pub async fn select_child(&self, child_id: &str) -> Result<u64> {
        self.deps.children.owned_profile(&self.guardian, child_id).await?;

        let guardian_id = self.guardian.user_id.clone();
        let locations = self.deps.telemetry.listen_latest_location(&guardian_id, child_id);
        let geofences = self.deps.geofences.listen_geofences(&guardian_id, child_id);
        let token = CancellationToken::new();

        let generation = {
            let mut current = lock(&self.current);
            if let Some(previous) = current.replace(token.clone()) {
                previous.cancel();
            }
            let generation = self.state.borrow().generation + 1;
            self.state.send_replace(SessionSnapshot {
                generation,
                child_id: Some(child_id.to_string()),
                ..SessionSnapshot::default()
            });
            generation
        };
        info!("Guardian {} now monitoring child {} (generation {})", guardian_id, child_id, generation);

        tokio::spawn(track_location(locations, self.state.clone(), generation, token.clone()));
        let sync = GeofenceRegistrySync::new(self.deps.guardian_monitor.clone(), self.deps.strategy, self.deps.mask);
        tokio::spawn(track_geofences(geofences, sync, self.state.clone(), generation, token));
        Ok(generation)
    }

    /// Stop watching any child
    pub fn clear_selection(&self) {
        let mut current = lock(&self.current);
        if let Some(previous) = current.take() {
            previous.cancel();
        }
        let generation = self.state.borrow().generation + 1;
        self.state.send_replace(SessionSnapshot {
            generation,
            ..SessionSnapshot::default()
        });
        debug!("Cleared selection for guardian {}", self.guardian.user_id);
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.current).take() {
            token.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Apply `update` only while `generation` is still the current selection
fn publish<F>(state: &watch::Sender<SessionSnapshot>, generation: u64, update: F) -> bool
where
    F: FnOnce(&mut SessionSnapshot),
{
    state.send_if_modified(|snapshot| {
        if snapshot.generation != generation {
            return false;
        }
        update(snapshot);
        true
    })
}

async fn track_location(
    mut subscription: TypedSubscription<ChildLocation>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    generation: u64,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            item = subscription.next() => match item {
                Some(Ok(locations)) => {
                    publish(&state, generation, |s| s.latest_location = locations.into_iter().next());
                }
                Some(Err(e)) => {
                    error!("Latest location stream failed: {}", e);
                    publish(&state, generation, |s| s.last_error = Some(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }
    subscription.close();
    debug!("Location tracking for generation {} stopped", generation);
}

async fn track_geofences(
    mut subscription: TypedSubscription<GeofenceArea>,
    mut sync: GeofenceRegistrySync,
    state: Arc<watch::Sender<SessionSnapshot>>,
    generation: u64,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            item = subscription.next() => match item {
                Some(Ok(areas)) => {
                    if !publish(&state, generation, |s| s.geofences = areas.clone()) {
                        break;
                    }
                    let report = sync.apply(&areas).await;
                    if !report.errors.is_empty() {
                        warn!("Guardian monitor sync reported {} errors", report.errors.len());
                        publish(&state, generation, |s| s.last_error = report.errors.last().cloned());
                    }
                }
                Some(Err(e)) => {
                    error!("Geofence stream failed: {}", e);
                    publish(&state, generation, |s| s.last_error = Some(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }
    subscription.close();
    debug!("Geofence tracking for generation {} stopped", generation);
}

/// Monitoring sessions keyed by guardian id
#[derive(Clone)]
pub struct MonitorSessions {
    deps: SessionDeps,
    sessions: Arc<Mutex<HashMap<String, Arc<MonitorSession>>>>,
}

impl MonitorSessions {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The guardian's session, created on first use
    pub fn session_for(&self, guardian: &User) -> Result<Arc<MonitorSession>> {
        require_guardian(guardian)?;
        let mut sessions = lock(&self.sessions);
        let session = sessions
            .entry(guardian.user_id.clone())
            .or_insert_with(|| Arc::new(MonitorSession::new(guardian.clone(), self.deps.clone())));
        Ok(session.clone())
    }

    /// Drop the guardian's session, cancelling its background tasks
    pub fn close(&self, guardian_id: &str) -> bool {
        let removed = lock(&self.sessions).remove(guardian_id);
        if let Some(session) = &removed {
            session.clear_selection();
        }
        removed.is_some()
    }
}
