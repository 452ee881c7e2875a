//! Shared fakes for the lifecycle integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use govern_core::{
    Authority, DecisionPatch, GovernanceManager, GovernanceRequest, ManagerSettings, MirrorStore,
    NewRequest, Notification, Notifier, RemoteFilter, RiskLevel, Scope,
};

// ============================================================================
// Fake remote authority
// ============================================================================

/// In-memory remote service with a switchable network and the same liveness
/// rules as the HTTP client: once marked unavailable, calls short-circuit
/// until a liveness check sees the service again.
pub struct FakeAuthority {
    records: Mutex<HashMap<String, GovernanceRequest>>,
    reachable: AtomicBool,
    available: AtomicBool,
    reject_submits: AtomicBool,
    reject_updates: AtomicBool,
    canonical_id: Mutex<Option<String>>,
    pub submits: AtomicU32,
    pub fetches: AtomicU32,
    pub updates: AtomicU32,
    pub lists: AtomicU32,
}

impl FakeAuthority {
    pub fn online() -> Arc<Self> {
        Arc::new(Self::with_network(true))
    }

    /// Service down from the start.
    pub fn offline() -> Arc<Self> {
        Arc::new(Self::with_network(false))
    }

    fn with_network(up: bool) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(up),
            available: AtomicBool::new(up),
            reject_submits: AtomicBool::new(false),
            reject_updates: AtomicBool::new(false),
            canonical_id: Mutex::new(None),
            submits: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
            updates: AtomicU32::new(0),
            lists: AtomicU32::new(0),
        }
    }

    /// Bring the network up or down. The liveness flag only changes on the next call.
    pub fn set_reachable(&self, up: bool) {
        self.reachable.store(up, Ordering::SeqCst);
    }

    /// Network back up and liveness restored, as after a successful call.
    pub fn restore(&self) {
        self.reachable.store(true, Ordering::SeqCst);
        self.available.store(true, Ordering::SeqCst);
    }

    pub fn reject_submits(&self, reject: bool) {
        self.reject_submits.store(reject, Ordering::SeqCst);
    }

    pub fn reject_updates(&self, reject: bool) {
        self.reject_updates.store(reject, Ordering::SeqCst);
    }

    pub fn assign_canonical_id(&self, id: &str) {
        *self.canonical_id.lock().unwrap() = Some(id.to_string());
    }

    pub fn insert(&self, record: GovernanceRequest) {
        self.records
            .lock()
            .unwrap()
            .insert(record.request_id.clone(), record);
    }

    pub fn get(&self, request_id: &str) -> Option<GovernanceRequest> {
        self.records.lock().unwrap().get(request_id).cloned()
    }

    /// Change a remote record behind the engine's back.
    pub fn edit(&self, request_id: &str, f: impl FnOnce(&mut GovernanceRequest)) {
        if let Some(record) = self.records.lock().unwrap().get_mut(request_id) {
            f(record);
        }
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    /// Mirror of the HTTP client's liveness handling. Returns false when the
    /// call must not proceed.
    fn connect(&self) -> bool {
        if !self.available.load(Ordering::SeqCst) {
            return false;
        }
        if !self.reachable.load(Ordering::SeqCst) {
            self.available.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }
}

#[async_trait]
impl Authority for FakeAuthority {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn submit(&self, record: &GovernanceRequest) -> Option<Value> {
        if !self.connect() {
            return None;
        }
        self.submits.fetch_add(1, Ordering::SeqCst);
        if self.reject_submits.load(Ordering::SeqCst) {
            return None;
        }

        let mut stored = record.without_annotations();
        if let Some(id) = self.canonical_id.lock().unwrap().clone() {
            stored.request_id = id;
        }
        let response = json!({ "request_id": stored.request_id, "status": "pending" });
        self.insert(stored);
        Some(response)
    }

    async fn fetch(&self, request_id: &str) -> Option<GovernanceRequest> {
        if !self.connect() {
            return None;
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.get(request_id)
    }

    async fn update(&self, request_id: &str, patch: &DecisionPatch) -> Option<Value> {
        if !self.connect() {
            return None;
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.reject_updates.load(Ordering::SeqCst) {
            return None;
        }
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(request_id)?;
        record.apply_patch(patch);
        Some(json!({ "request_id": request_id, "status": patch.status }))
    }

    async fn list(&self, filter: &RemoteFilter) -> Option<Vec<GovernanceRequest>> {
        if !self.connect() {
            return None;
        }
        self.lists.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().unwrap();
        let mut out: Vec<GovernanceRequest> = records
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status() == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        Some(out)
    }

    async fn probe(&self) -> bool {
        let up = self.reachable.load(Ordering::SeqCst);
        self.available.store(up, Ordering::SeqCst);
        up
    }
}

// ============================================================================
// Recording notifier
// ============================================================================

pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    deliver: bool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            deliver: true,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            deliver: false,
        })
    }

    pub fn last(&self) -> Option<Notification> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> bool {
        self.sent.lock().unwrap().push(notification.clone());
        self.deliver
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn settings() -> ManagerSettings {
    ManagerSettings {
        approver: "manager".into(),
        session_name: None,
        poll_interval: Duration::from_secs(5),
        reconnect: true,
    }
}

pub fn manager(
    root: &Path,
    authority: &Arc<FakeAuthority>,
    notifier: &Arc<RecordingNotifier>,
) -> GovernanceManager {
    GovernanceManager::new(
        authority.clone(),
        Some(MirrorStore::new(root)),
        notifier.clone(),
    )
    .with_settings(settings())
}

pub fn api_only_manager(
    authority: &Arc<FakeAuthority>,
    notifier: &Arc<RecordingNotifier>,
) -> GovernanceManager {
    GovernanceManager::new(authority.clone(), None, notifier.clone()).with_settings(settings())
}

pub fn spawn_request(agent: &str, risk: RiskLevel) -> NewRequest {
    NewRequest {
        operation_type: "spawn".into(),
        agent: agent.into(),
        reason: "need more capacity".into(),
        requester: "chief-of-staff".into(),
        scope: Scope::Local,
        risk,
        ..NewRequest::default()
    }
}
