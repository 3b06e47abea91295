//! Typed repositories over the document store.

pub mod child_profile_repository;
pub mod geofence_repository;
pub mod graph_repository;
pub mod telemetry_repository;
pub mod transition_repository;
pub mod user_repository;

pub use child_profile_repository::ChildProfileRepository;
pub use geofence_repository::GeofenceRepository;
pub use graph_repository::GraphRepository;
pub use telemetry_repository::{TelemetryRepository, TimeWindow};
pub use transition_repository::TransitionRepository;
pub use user_repository::{AuthAccount, UserRepository};
