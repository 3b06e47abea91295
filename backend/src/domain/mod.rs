//! # Domain Module
//!
//! Business rules of the guardian backend, independent of HTTP and of the
//! concrete store.
//!
//! ## Module Organization
//!
//! - **auth_service**: registration, login and bearer sessions
//! - **child_service**: guardian/child association, profiles and thresholds
//! - **geofence_service**: geofence validation and registry operations
//! - **geofence_sync**: mirroring a live geofence list into a monitor
//! - **transition_handler**: recording and announcing geofence transitions
//! - **telemetry_service**: sample ingestion, bracelet messages, reads and export
//! - **monitor_session**: per-guardian child selection with live cells
//! - **analysis_service**: plain-text analysis of bracelet data
//! - **calendar**: month view of meltdown episodes
//! - **graph_service**: saved chart references
//!
//! ## Business Rules
//!
//! - Only guardians manage children, geofences, graphs and sessions
//! - Only child accounts record telemetry, always under their guardian's tree
//! - Geofence input is validated before anything is written
//! - Monitor mirroring and notifications are best-effort and never undo a write

pub mod analysis_service;
pub mod auth_service;
pub mod calendar;
pub mod child_service;
pub mod errors;
pub mod geofence_service;
pub mod geofence_sync;
pub mod graph_service;
pub mod monitor_session;
pub mod telemetry_service;
pub mod transition_handler;

pub use analysis_service::AnalysisService;
pub use auth_service::AuthService;
pub use calendar::CalendarService;
pub use child_service::ChildService;
pub use errors::{GeofenceValidationError, GuardianError, Result};
pub use geofence_service::GeofenceService;
pub use geofence_sync::{GeofenceRegistrySync, SyncReport, SyncStrategy};
pub use graph_service::GraphService;
pub use monitor_session::{MonitorSession, MonitorSessions, SessionDeps, SessionSnapshot};
pub use telemetry_service::{BraceletOutcome, TelemetryService};
pub use transition_handler::TransitionHandler;
