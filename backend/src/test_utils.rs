//! Shared fixtures for unit tests: store setups, seeded accounts, and fakes
//! for the store, the geofence monitor and the notifier.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use shared::{ChildProfile, ChildThresholds, GeoPoint, GeofenceArea, Notification, NotificationChannel, Role, User};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::domain::child_service::ChildService;
use crate::platform::{GeofenceMonitor, MonitorError, MonitoredRegion, Notifier};
use crate::storage::repositories::{
    ChildProfileRepository, GeofenceRepository, GraphRepository, TelemetryRepository, TransitionRepository, UserRepository,
};
use crate::storage::{DbConnection, Document, DocumentStore, Query, Snapshot, StoreError, Subscription};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Every repository wired to the same store
pub struct TestStore {
    pub store: Arc<dyn DocumentStore>,
    pub users: UserRepository,
    pub profiles: ChildProfileRepository,
    pub geofences: GeofenceRepository,
    pub telemetry: TelemetryRepository,
    pub graphs: GraphRepository,
    pub transitions: TransitionRepository,
}

impl TestStore {
    pub async fn sqlite() -> Self {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        Self::with_store(Arc::new(db))
    }

    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: UserRepository::new(store.clone()),
            profiles: ChildProfileRepository::new(store.clone()),
            geofences: GeofenceRepository::new(store.clone()),
            telemetry: TelemetryRepository::new(store.clone()),
            graphs: GraphRepository::new(store.clone()),
            transitions: TransitionRepository::new(store.clone()),
            store,
        }
    }

    pub fn child_service(&self) -> ChildService {
        ChildService::new(self.users.clone(), self.profiles.clone())
    }
}

fn user(user_id: &str, email: &str, role: Role) -> User {
    User {
        user_id: user_id.to_string(),
        email: email.to_string(),
        role,
        name: None,
        associated_children: Vec::new(),
        guardian_id: None,
        created_at: Utc::now(),
    }
}

/// A stored guardian and an unassociated child account
pub async fn seed_pair(users: &UserRepository) -> (User, User) {
    let guardian = user("guardian-1", "parent@example.com", Role::Guardian);
    let child = user("child-1", "kid@example.com", Role::Child);
    users.store_user(&guardian).await.expect("store guardian");
    users.store_user(&child).await.expect("store child");
    (guardian, child)
}

/// A guardian with one associated child and its profile
pub async fn seed_associated(store: &TestStore) -> (User, User) {
    let (mut guardian, mut child) = seed_pair(&store.users).await;
    guardian.associated_children.push(child.user_id.clone());
    child.guardian_id = Some(guardian.user_id.clone());
    store.users.store_user(&guardian).await.expect("store guardian");
    store.users.store_user(&child).await.expect("store child");

    let profile = ChildProfile {
        child_id: child.user_id.clone(),
        name: "Leo".to_string(),
        dob: None,
        avatar_url: None,
        thresholds: ChildThresholds::default(),
    };
    store
        .profiles
        .store_profile(&guardian.user_id, &profile)
        .await
        .expect("store profile");
    (guardian, child)
}

pub fn area(id: &str, child_id: &str, radius: f64) -> GeofenceArea {
    GeofenceArea {
        id: id.to_string(),
        child_id: child_id.to_string(),
        name: format!("Area {}", id),
        latitude: 40.0,
        longitude: -3.0,
        radius,
        creation_time: Utc::now(),
    }
}

struct FakeListener {
    sender: mpsc::Sender<Result<Snapshot, StoreError>>,
    closed: Arc<AtomicBool>,
}

/// In-memory store whose live queries are driven by the test
///
/// Listeners receive nothing until the test calls [`FakeStore::emit`] or
/// [`FakeStore::fail`].
#[derive(Default)]
pub struct FakeStore {
    documents: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    listeners: Mutex<HashMap<String, Vec<FakeListener>>>,
    writes: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed a document without counting it as a write
    pub fn insert(&self, path: &str, id: &str, data: Value) {
        lock(&self.documents)
            .entry(path.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    /// Deliver a snapshot to every open listener on `path`
    pub async fn emit(&self, path: &str, snapshot: Snapshot) {
        for sender in self.open_senders(path) {
            let _ = sender.send(Ok(snapshot.clone())).await;
        }
    }

    /// Deliver a terminal error to every open listener on `path`
    pub async fn fail(&self, path: &str, error: StoreError) {
        let message = error.to_string();
        for sender in self.open_senders(path) {
            let _ = sender.send(Err(StoreError::Listener(message.clone()))).await;
        }
    }

    /// Number of listeners on `path` that have not been torn down
    pub fn open_listeners(&self, path: &str) -> usize {
        lock(&self.listeners)
            .get(path)
            .map(|l| l.iter().filter(|l| !l.closed.load(Ordering::SeqCst)).count())
            .unwrap_or(0)
    }

    /// Number of listeners ever opened on `path`
    pub fn listener_count(&self, path: &str) -> usize {
        lock(&self.listeners).get(path).map(|l| l.len()).unwrap_or(0)
    }

    fn open_senders(&self, path: &str) -> Vec<mpsc::Sender<Result<Snapshot, StoreError>>> {
        lock(&self.listeners)
            .get(path)
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|l| !l.closed.load(Ordering::SeqCst))
                    .map(|l| l.sender.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn get(&self, path: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(lock(&self.documents).get(path).and_then(|c| c.get(id)).map(|data| Document {
            id: id.to_string(),
            data: data.clone(),
        }))
    }

    async fn set(&self, path: &str, id: &str, data: Value) -> Result<(), StoreError> {
        self.record_write();
        self.insert(path, id, data);
        Ok(())
    }

    async fn add(&self, path: &str, data: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.set(path, &id, data).await?;
        Ok(id)
    }

    async fn update_fields(&self, path: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        self.record_write();
        let mut documents = lock(&self.documents);
        let existing = documents
            .get_mut(path)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
                id: id.to_string(),
            })?;
        if let (Some(target), Some(source)) = (existing.as_object_mut(), fields.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str, id: &str) -> Result<bool, StoreError> {
        self.record_write();
        Ok(lock(&self.documents)
            .get_mut(path)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn query(&self, path: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let documents: Vec<Document> = lock(&self.documents)
            .get(path)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(query.apply(documents))
    }

    fn listen(&self, path: &str, _query: Query) -> Subscription<Snapshot> {
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        let (sender, subscription) = Subscription::channel(move || flag.store(true, Ordering::SeqCst));
        lock(&self.listeners)
            .entry(path.to_string())
            .or_default()
            .push(FakeListener { sender, closed });
        subscription
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorCall {
    Register(Vec<String>),
    Unregister(Vec<String>),
}

/// Geofence monitor that records calls and can be told to fail
#[derive(Default)]
pub struct RecordingMonitor {
    calls: Mutex<Vec<MonitorCall>>,
    regions: Mutex<BTreeMap<String, MonitoredRegion>>,
    observed: Mutex<Vec<(String, GeoPoint)>>,
    fail_register: AtomicBool,
    fail_unregister: AtomicBool,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MonitorCall> {
        lock(&self.calls).clone()
    }

    pub fn observed(&self) -> Vec<(String, GeoPoint)> {
        lock(&self.observed).clone()
    }

    pub fn fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn fail_unregister(&self, fail: bool) {
        self.fail_unregister.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GeofenceMonitor for RecordingMonitor {
    async fn register(&self, regions: &[MonitoredRegion]) -> Result<(), MonitorError> {
        lock(&self.calls).push(MonitorCall::Register(regions.iter().map(|r| r.id.clone()).collect()));
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(MonitorError::NotAvailable);
        }
        let mut current = lock(&self.regions);
        for region in regions {
            current.insert(region.id.clone(), region.clone());
        }
        Ok(())
    }

    async fn unregister(&self, ids: &[String]) -> Result<(), MonitorError> {
        lock(&self.calls).push(MonitorCall::Unregister(ids.to_vec()));
        if self.fail_unregister.load(Ordering::SeqCst) {
            return Err(MonitorError::NotAvailable);
        }
        let mut current = lock(&self.regions);
        for id in ids {
            current.remove(id);
        }
        Ok(())
    }

    fn registered_ids(&self) -> Vec<String> {
        lock(&self.regions).keys().cloned().collect()
    }

    async fn observe_location(&self, child_id: &str, point: GeoPoint, _at: chrono::DateTime<Utc>) -> Result<(), MonitorError> {
        lock(&self.observed).push((child_id.to_string(), point));
        Ok(())
    }
}

/// Notifier that keeps every dispatched notification
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: NotificationChannel, title: &str, body: &str) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("notification channel unavailable");
        }
        lock(&self.sent).push(Notification {
            channel,
            title: title.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}
