//! # Guardian Backend
//!
//! Server side of the guardian/child monitoring app: accounts and child
//! profiles, geofences with transition alerts, telemetry from the child's
//! phone and bracelet, live queries and per-guardian monitoring sessions.
//!
//! ## Architecture
//!
//! ```text
//! Guardian app / child device / bracelet bridge
//!     ↓
//! IO Layer (REST API, SSE live queries)
//!     ↓
//! Domain Layer (services, monitoring sessions, transition handling)
//!     ↓
//! Storage Layer (document store on SQLite)     Platform (monitors, notifier, completion)
//! ```
//!
//! ## Key Responsibilities
//!
//! - Initialize and configure the application state
//! - Start the geofence transition handler
//! - Set up the REST API router with proper CORS configuration

pub mod config;
pub mod domain;
pub mod io;
pub mod platform;
pub mod storage;

#[cfg(test)]
pub mod test_utils;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderValue, Method},
    Router,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{AppConfig, ServerConfig};
use crate::domain::{
    AnalysisService, AuthService, CalendarService, ChildService, GeofenceService, GraphService, MonitorSessions,
    SessionDeps, TelemetryService, TransitionHandler,
};
use crate::platform::{GeminiClient, LocalGeofenceMonitor, OutboxNotifier, TextCompletion};
use crate::storage::repositories::{
    ChildProfileRepository, GeofenceRepository, GraphRepository, TelemetryRepository, TransitionRepository, UserRepository,
};
use crate::storage::{DbConnection, DocumentStore};

/// Main application state that holds all services
#[derive(Clone)]
pub struct AppState {
    pub auth_service: AuthService,
    pub child_service: ChildService,
    pub geofence_service: GeofenceService,
    pub telemetry_service: TelemetryService,
    pub analysis_service: AnalysisService,
    pub calendar_service: CalendarService,
    pub graph_service: GraphService,
    pub transition_handler: TransitionHandler,
    pub monitor_sessions: MonitorSessions,
    pub notifier: Arc<OutboxNotifier>,
    /// Regions of geofences on the children's devices
    pub child_monitor: Arc<LocalGeofenceMonitor>,
    /// Regions mirrored for the guardian's currently selected child
    pub guardian_monitor: Arc<LocalGeofenceMonitor>,
    /// Cancelled on shutdown to stop background tasks
    pub shutdown: CancellationToken,
}

/// Initialize the backend with all required services
pub async fn initialize_backend(config: &AppConfig) -> Result<AppState> {
    info!("Setting up database");
    let db_conn = DbConnection::new(&config.database_url).await?;

    start_backend(Arc::new(db_conn), config).await
}

/// Build the state and replay stored geofences into the child monitor, which
/// starts empty in every new process
pub async fn start_backend(store: Arc<dyn DocumentStore>, config: &AppConfig) -> Result<AppState> {
    let state = build_state(store, config)?;
    state
        .geofence_service
        .restore_child_monitor()
        .await
        .context("Failed to restore geofences")?;
    Ok(state)
}

/// Wire every service to `store` and start the transition handler
pub fn build_state(store: Arc<dyn DocumentStore>, config: &AppConfig) -> Result<AppState> {
    info!("Setting up platform adapters");
    let (transition_tx, transition_rx) = mpsc::unbounded_channel();
    let geofence = &config.geofence;
    let child_monitor = Arc::new(LocalGeofenceMonitor::new(
        "child-device",
        geofence.max_regions,
        geofence.dwell_delay(),
        geofence.location_permission_granted,
        transition_tx.clone(),
    ));
    let guardian_monitor = Arc::new(LocalGeofenceMonitor::new(
        "guardian-device",
        geofence.max_regions,
        geofence.dwell_delay(),
        geofence.location_permission_granted,
        transition_tx,
    ));
    let notifier = Arc::new(OutboxNotifier::new());
    let completion: Option<Arc<dyn TextCompletion>> = match config.analysis.api_key.as_deref() {
        Some(api_key) => {
            let client = GeminiClient::new(
                &config.analysis.endpoint,
                &config.analysis.model,
                api_key,
                std::time::Duration::from_secs(config.analysis.timeout_secs),
            )
            .context("Failed to create analysis client")?;
            Some(Arc::new(client) as Arc<dyn TextCompletion>)
        }
        None => {
            info!("No analysis API key configured, chart analysis is disabled");
            None
        }
    };

    info!("Setting up domain model");
    let users = UserRepository::new(store.clone());
    let telemetry = TelemetryRepository::new(store.clone());
    let child_service = ChildService::new(users.clone(), ChildProfileRepository::new(store.clone()));
    let mask = geofence.transition_mask();
    let geofence_service = GeofenceService::new(
        child_service.clone(),
        GeofenceRepository::new(store.clone()),
        child_monitor.clone(),
        mask,
    );
    let telemetry_service = TelemetryService::new(
        child_service.clone(),
        users.clone(),
        telemetry.clone(),
        child_monitor.clone(),
        notifier.clone(),
    );
    let transition_handler = TransitionHandler::new(TransitionRepository::new(store.clone()), notifier.clone());
    let monitor_sessions = MonitorSessions::new(SessionDeps {
        children: child_service.clone(),
        geofences: geofence_service.clone(),
        telemetry: telemetry_service.clone(),
        guardian_monitor: guardian_monitor.clone(),
        strategy: geofence.sync_strategy,
        mask,
    });

    let shutdown = CancellationToken::new();
    tokio::spawn(transition_handler.clone().run(transition_rx, shutdown.clone()));

    info!("Setting up application state");
    Ok(AppState {
        auth_service: AuthService::new(users),
        analysis_service: AnalysisService::new(
            child_service.clone(),
            telemetry.clone(),
            completion,
            config.analysis.sample_size,
        ),
        calendar_service: CalendarService::new(child_service.clone(), telemetry),
        graph_service: GraphService::new(child_service.clone(), GraphRepository::new(store)),
        child_service,
        geofence_service,
        telemetry_service,
        transition_handler,
        monitor_sessions,
        notifier,
        child_monitor,
        guardian_monitor,
        shutdown,
    })
}

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState, server: &ServerConfig) -> Result<Router> {
    // CORS setup to allow the guardian app to make requests
    let origin = server
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin {:?}", server.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Ok(Router::new()
        .nest("/api", io::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state))
}
