//! # Platform Adapters
//!
//! External collaborators the domain depends on, each behind a trait:
//! the geofence monitor, notification delivery and text completion.

pub mod completion;
pub mod geofence_monitor;
pub mod notifier;

pub use completion::{GeminiClient, TextCompletion};
pub use geofence_monitor::{GeofenceMonitor, LocalGeofenceMonitor, MonitorError, MonitoredRegion, TransitionMask};
pub use notifier::{Notifier, OutboxNotifier};
