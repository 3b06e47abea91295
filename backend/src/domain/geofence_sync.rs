//! Mirrors a child's live geofence list into a geofence monitor.
//!
//! Two strategies are supported. `FullReplace` unregisters every id in the
//! incoming list and then registers the whole list; it ignores the empty list.
//! `Delta` diffs against the last applied set and touches only what changed;
//! regions whose registration failed are retried on the next update.

use serde::{Deserialize, Serialize};
use shared::GeofenceArea;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::platform::{GeofenceMonitor, MonitoredRegion, TransitionMask};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    #[default]
    FullReplace,
    Delta,
}

/// Outcome of one synchronization pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub registered: usize,
    pub unregistered: usize,
    pub unchanged: usize,
    pub errors: Vec<String>,
}

pub struct GeofenceRegistrySync {
    monitor: Arc<dyn GeofenceMonitor>,
    strategy: SyncStrategy,
    mask: TransitionMask,
    applied: BTreeMap<String, MonitoredRegion>,
}

impl GeofenceRegistrySync {
    pub fn new(monitor: Arc<dyn GeofenceMonitor>, strategy: SyncStrategy, mask: TransitionMask) -> Self {
        Self {
            monitor,
            strategy,
            mask,
            applied: BTreeMap::new(),
        }
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    /// Bring the monitor in line with `areas`
    pub async fn apply(&mut self, areas: &[GeofenceArea]) -> SyncReport {
        match self.strategy {
            SyncStrategy::FullReplace => self.full_replace(areas).await,
            SyncStrategy::Delta => self.delta(areas).await,
        }
    }

    async fn full_replace(&mut self, areas: &[GeofenceArea]) -> SyncReport {
        let mut report = SyncReport::default();
        if areas.is_empty() {
            debug!("Geofence list is empty, nothing to mirror");
            return report;
        }

        let ids: Vec<String> = areas.iter().map(|a| a.id.clone()).collect();
        match self.monitor.unregister(&ids).await {
            Ok(()) => report.unregistered = ids.len(),
            Err(e) => {
                error!("Failed to remove geofences before re-adding: {}", e);
                report.errors.push(e.to_string());
            }
        }

        let regions: Vec<MonitoredRegion> = areas.iter().map(|a| MonitoredRegion::from_area(a, self.mask)).collect();
        match self.monitor.register(&regions).await {
            Ok(()) => {
                report.registered = regions.len();
                info!("Mirrored {} geofences into the monitor", regions.len());
            }
            Err(e) => {
                error!("Failed to add geofences to the monitor: {}", e);
                report.errors.push(e.to_string());
            }
        }
        report
    }

    async fn delta(&mut self, areas: &[GeofenceArea]) -> SyncReport {
        let mut report = SyncReport::default();
        let desired: BTreeMap<String, MonitoredRegion> = areas
            .iter()
            .map(|a| (a.id.clone(), MonitoredRegion::from_area(a, self.mask)))
            .collect();

        let to_remove: Vec<String> = self
            .applied
            .iter()
            .filter(|(id, region)| desired.get(*id) != Some(*region))
            .map(|(id, _)| id.clone())
            .collect();
        let to_add: Vec<MonitoredRegion> = desired
            .iter()
            .filter(|(id, region)| self.applied.get(*id) != Some(*region))
            .map(|(_, region)| region.clone())
            .collect();
        report.unchanged = desired.len() - to_add.len();

        if !to_remove.is_empty() {
            match self.monitor.unregister(&to_remove).await {
                Ok(()) => {
                    for id in &to_remove {
                        self.applied.remove(id);
                    }
                    report.unregistered = to_remove.len();
                }
                Err(e) => {
                    error!("Failed to remove {} stale geofences: {}", to_remove.len(), e);
                    report.errors.push(e.to_string());
                }
            }
        }

        if !to_add.is_empty() {
            match self.monitor.register(&to_add).await {
                Ok(()) => {
                    report.registered = to_add.len();
                    for region in to_add {
                        self.applied.insert(region.id.clone(), region);
                    }
                }
                Err(e) => {
                    error!("Failed to add {} geofences: {}", to_add.len(), e);
                    report.errors.push(e.to_string());
                }
            }
        }

        info!(
            "Geofence delta: +{} -{} ={}",
            report.registered, report.unregistered, report.unchanged
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{area, MonitorCall, RecordingMonitor};

    fn sync(strategy: SyncStrategy) -> (GeofenceRegistrySync, Arc<RecordingMonitor>) {
        let monitor = Arc::new(RecordingMonitor::new());
        (
            GeofenceRegistrySync::new(monitor.clone(), strategy, TransitionMask::default()),
            monitor,
        )
    }

    #[tokio::test]
    async fn test_full_replace_removes_then_adds_everything() {
        let (mut sync, monitor) = sync(SyncStrategy::FullReplace);
        let areas = vec![area("a", "c1", 10.0), area("b", "c1", 20.0)];

        sync.apply(&areas).await;
        sync.apply(&areas).await;

        let ab = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            monitor.calls(),
            vec![
                MonitorCall::Unregister(ab.clone()),
                MonitorCall::Register(ab.clone()),
                MonitorCall::Unregister(ab.clone()),
                MonitorCall::Register(ab),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_replace_add_survives_remove_failure() {
        let (mut sync, monitor) = sync(SyncStrategy::FullReplace);
        monitor.fail_unregister(true);

        let report = sync.apply(&[area("a", "c1", 10.0)]).await;
        assert_eq!(report.registered, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(monitor.registered_ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_full_replace_ignores_empty_list() {
        let (mut sync, monitor) = sync(SyncStrategy::FullReplace);
        sync.apply(&[area("a", "c1", 10.0)]).await;
        let calls_before = monitor.calls().len();

        let report = sync.apply(&[]).await;
        assert_eq!(report, SyncReport::default());
        assert_eq!(monitor.calls().len(), calls_before);
        assert_eq!(monitor.registered_ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_delta_applies_only_changes() {
        let (mut sync, monitor) = sync(SyncStrategy::Delta);
        sync.apply(&[area("a", "c1", 10.0), area("b", "c1", 20.0)]).await;

        // b resized, a unchanged, c new
        let report = sync
            .apply(&[area("a", "c1", 10.0), area("b", "c1", 25.0), area("c", "c1", 5.0)])
            .await;
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.unregistered, 1);
        assert_eq!(report.registered, 2);

        let calls = monitor.calls();
        assert_eq!(calls[calls.len() - 2], MonitorCall::Unregister(vec!["b".to_string()]));
        assert_eq!(calls[calls.len() - 1], MonitorCall::Register(vec!["b".to_string(), "c".to_string()]));

        // Dropping everything removes the remaining regions
        sync.apply(&[]).await;
        assert!(monitor.registered_ids().is_empty());
    }

    #[tokio::test]
    async fn test_delta_retries_failed_registration() {
        let (mut sync, monitor) = sync(SyncStrategy::Delta);
        monitor.fail_register(true);
        let report = sync.apply(&[area("a", "c1", 10.0)]).await;
        assert_eq!(report.errors.len(), 1);

        monitor.fail_register(false);
        let report = sync.apply(&[area("a", "c1", 10.0)]).await;
        assert_eq!(report.registered, 1);
        assert_eq!(monitor.registered_ids(), vec!["a"]);
    }
}
