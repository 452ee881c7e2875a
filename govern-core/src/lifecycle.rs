//! Request lifecycle: create, fetch, list, decide, and wait.
//!
//! Each operation talks to the remote authority first, then the local mirror,
//! then reconciles the two into the single view it reports. Remote failures
//! degrade to mirror-only results and show up in flags (`api_synced`,
//! `api_available`), never as errors.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use govern_common::config::{Config, OperationMode};
use govern_common::{Error, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::authority::{Authority, HttpAuthority, RemoteFilter};
use crate::mirror::{MirrorStore, Shelf, StoredRecord};
use crate::notify::{
    CommandNotifier, DisabledNotifier, Notification, NotificationKind, Notifier, Priority,
};
use crate::poll::{PollSchedule, Tick};
use crate::reconcile::reconcile;
use crate::record::{
    new_request_id, Decision, DecisionPatch, GovernanceRequest, Impact, Operation, RecordSource,
    RequestStatus, RiskLevel, Scope,
};

/// Tunables that do not belong to any single collaborator.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Recipient of new-request routing notifications
    pub approver: String,
    /// Default `source_cos` when the caller gives none
    pub session_name: Option<String>,
    pub poll_interval: Duration,
    /// Re-check an unreachable service on every wait poll
    pub reconnect: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            approver: "ai-maestro-assistant-manager-agent".into(),
            session_name: None,
            poll_interval: Duration::from_secs(5),
            reconnect: true,
        }
    }
}

/// Input to [`GovernanceManager::create`].
#[derive(Debug, Clone, Default)]
pub struct NewRequest {
    pub operation_type: String,
    pub agent: String,
    pub reason: String,
    pub requester: String,
    pub scope: Scope,
    pub risk: RiskLevel,
    pub source_cos: Option<String>,
    pub source_manager: Option<String>,
    pub target_cos: Option<String>,
    pub target_manager: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOutcome {
    pub request_id: String,
    pub status: RequestStatus,
    pub api_synced: bool,
    /// Mirror file, absent in api-only mode
    pub filepath: Option<PathBuf>,
    pub message_sent: bool,
}

/// A reconciled request and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestView {
    pub record: GovernanceRequest,
    pub source: RecordSource,
    /// Shelf the mirror copy sits on after this call, if there is one
    pub shelf: Option<Shelf>,
}

impl RequestView {
    pub fn status(&self) -> RequestStatus {
        self.record.status()
    }
}

/// Status filter for [`GovernanceManager::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    Pending,
    All,
    Status(RequestStatus),
}

impl ListFilter {
    fn remote(&self) -> RemoteFilter {
        match self {
            Self::Pending => RemoteFilter::status(RequestStatus::Pending),
            Self::All => RemoteFilter::default(),
            Self::Status(status) => RemoteFilter::status(*status),
        }
    }

    fn shelves(&self) -> &'static [Shelf] {
        match self {
            Self::Pending => &[Shelf::Pending],
            Self::All => &[Shelf::Pending, Shelf::Completed],
            Self::Status(status) if status.is_terminal() => &[Shelf::Completed],
            Self::Status(_) => &[Shelf::Pending],
        }
    }

    pub fn matches(&self, status: RequestStatus) -> bool {
        match self {
            Self::Pending => !status.is_terminal(),
            Self::All => true,
            Self::Status(wanted) => *wanted == status,
        }
    }
}

impl FromStr for ListFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "all" => Ok(Self::All),
            other => other
                .parse::<RequestStatus>()
                .map(Self::Status)
                .map_err(|_| Error::Validation(format!("Invalid status filter: {other}"))),
        }
    }
}

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEntry {
    pub request_id: String,
    pub operation_type: Option<String>,
    pub agent_name: Option<String>,
    pub status: RequestStatus,
    pub requester: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub decision: Option<Decision>,
    pub decided_at: Option<DateTime<Utc>>,
    pub api_synced: bool,
    #[serde(rename = "_source")]
    pub source: RecordSource,
}

impl ListEntry {
    fn from_record(record: &GovernanceRequest, source: RecordSource, api_synced: bool) -> Self {
        Self {
            request_id: record.request_id.clone(),
            operation_type: record.operation_kind().map(str::to_string),
            agent_name: record.target_name().map(str::to_string),
            status: record.status(),
            requester: record.requester.clone(),
            created_at: record.created_at,
            decision: record.decision,
            decided_at: record.decided_at,
            api_synced,
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListOutcome {
    pub total_count: usize,
    pub pending_count: usize,
    pub api_available: bool,
    pub requests: Vec<ListEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecideOutcome {
    pub request_id: String,
    pub decision: Decision,
    /// Status written to both stores
    pub api_status: RequestStatus,
    pub previous_status: RequestStatus,
    pub comment: String,
    pub decided_by: String,
    pub api_synced: bool,
    pub notification_sent: bool,
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Decided {
        view: RequestView,
        waited_seconds: u64,
    },
    TimedOut {
        request_id: String,
        waited_seconds: u64,
        timeout_secs: u64,
    },
    Cancelled {
        request_id: String,
        waited_seconds: u64,
    },
}

impl WaitOutcome {
    pub fn is_decided(&self) -> bool {
        matches!(self, Self::Decided { .. })
    }

    pub fn waited_seconds(&self) -> u64 {
        match self {
            Self::Decided { waited_seconds, .. }
            | Self::TimedOut { waited_seconds, .. }
            | Self::Cancelled { waited_seconds, .. } => *waited_seconds,
        }
    }
}

/// Dual-authority governance request manager.
pub struct GovernanceManager {
    pub(crate) authority: Arc<dyn Authority>,
    pub(crate) mirror: Option<MirrorStore>,
    notifier: Arc<dyn Notifier>,
    settings: ManagerSettings,
}

impl GovernanceManager {
    /// Assemble a manager from its collaborators. `mirror: None` is api-only mode.
    pub fn new(
        authority: Arc<dyn Authority>,
        mirror: Option<MirrorStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            authority,
            mirror,
            notifier,
            settings: ManagerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the HTTP authority, mirror, and notifier described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = HttpAuthority::new(&config.api)?;
        let http = match config.api.mode {
            OperationMode::Offline => http.offline(),
            _ => http,
        };

        let mirror = config
            .api
            .mode
            .uses_mirror()
            .then(|| MirrorStore::new(config.mirror.root()));

        let notifier: Arc<dyn Notifier> = if config.notify.enabled {
            Arc::new(CommandNotifier::from_config(&config.notify))
        } else {
            Arc::new(DisabledNotifier)
        };

        tracing::debug!(
            mode = config.api.mode.as_str(),
            api = %config.api.requests_url(),
            mirror = ?mirror.as_ref().map(|m| m.root().to_path_buf()),
            "Governance manager configured"
        );

        Ok(Self::new(Arc::new(http), mirror, notifier).with_settings(ManagerSettings {
            approver: config.notify.approver.clone(),
            session_name: config.identity.session_name.clone(),
            poll_interval: config.wait.poll_interval(),
            reconnect: config.api.mode != OperationMode::Offline,
        }))
    }

    pub fn api_available(&self) -> bool {
        self.authority.is_available()
    }

    pub fn mirror(&self) -> Option<&MirrorStore> {
        self.mirror.as_ref()
    }

    // =========================================================================
    // create
    // =========================================================================

    /// Create a request. Succeeds as long as the mirror write succeeds,
    /// whether or not the remote side accepted the record.
    pub async fn create(&self, input: NewRequest) -> Result<CreateOutcome> {
        let now = Utc::now();
        let mut record = build_record(&input, new_request_id(now), now, &self.settings);

        if let Some(response) = self.authority.submit(&record).await {
            record.api_synced = true;
            let canonical = response
                .get("request_id")
                .and_then(|v| v.as_str())
                .filter(|id| !id.is_empty() && *id != record.request_id);
            if let Some(canonical) = canonical {
                tracing::info!(local = %record.request_id, canonical, "Adopting canonical request id");
                record.request_id = canonical.to_string();
            }
        }

        let filepath = match &self.mirror {
            Some(mirror) => Some(mirror.save(&record.request_id, &record, true)?),
            None if record.api_synced => None,
            None => return Err(self.remote_failure("create request")),
        };

        tracing::info!(
            request_id = %record.request_id,
            api_synced = record.api_synced,
            risk = input.risk.as_str(),
            "Governance request created"
        );

        let message_sent = self
            .notifier
            .send(&Notification {
                to: self.settings.approver.clone(),
                subject: format!("[GOVERNANCE] {}: {}", input.operation_type, input.agent),
                kind: NotificationKind::GovernanceRequest,
                message: format!(
                    "GovernanceRequest submitted for {op}.\n\n\
                     Request ID: {id}\n\
                     Operation: {op}\n\
                     Agent/Resource: {agent}\n\
                     Reason: {reason}\n\
                     Scope: {scope}\n\
                     Risk: {risk}\n\
                     Requester: {requester}",
                    op = input.operation_type,
                    id = record.request_id,
                    agent = input.agent,
                    reason = input.reason,
                    scope = input.scope.as_str(),
                    risk = input.risk.as_str(),
                    requester = input.requester,
                ),
                request_id: record.request_id.clone(),
                priority: if input.risk.is_elevated() {
                    Priority::High
                } else {
                    Priority::Normal
                },
            })
            .await;

        Ok(CreateOutcome {
            request_id: record.request_id,
            status: RequestStatus::Pending,
            api_synced: record.api_synced,
            filepath,
            message_sent,
        })
    }

    // =========================================================================
    // fetch
    // =========================================================================

    /// Reconcile both views of a request and repair the mirror if it drifted.
    pub async fn fetch(&self, request_id: &str) -> Result<RequestView> {
        let remote = self.authority.fetch(request_id).await;
        let stored = self.load_mirror(request_id)?;

        let merged = reconcile(remote.as_ref(), stored.as_ref().map(|s| &s.record));
        if merged.is_empty() {
            return Err(Error::NotFound(format!("Request {request_id} not found")));
        }
        if let (Some(remote), Some(local)) = (&remote, &stored) {
            match merged.source {
                RecordSource::LocalAhead => tracing::warn!(
                    request_id,
                    local = %local.record.status(),
                    remote = %remote.status(),
                    "Local decision not yet synced, keeping mirror state"
                ),
                RecordSource::Conflict => tracing::warn!(
                    request_id,
                    local = %local.record.status(),
                    remote = %remote.status(),
                    "Unsynced local decision conflicts with remote decision, remote wins"
                ),
                _ => {}
            }
        }

        let mut shelf = stored.as_ref().map(|s| s.shelf);
        if let (true, Some(mirror), Some(local)) = (merged.takes_remote(), &self.mirror, &stored) {
            let target = Shelf::for_pending(!merged.record.status().is_terminal());
            if merged.record != local.record || local.shelf != target {
                mirror.save(request_id, &merged.record, target == Shelf::Pending)?;
                tracing::info!(
                    request_id,
                    status = %merged.record.status(),
                    shelf = target.as_str(),
                    "Mirror reconciled with remote state"
                );
            }
            shelf = Some(target);
        }

        Ok(RequestView {
            record: merged.record,
            source: merged.source,
            shelf,
        })
    }

    // =========================================================================
    // list
    // =========================================================================

    /// Union of the remote listing and local records the remote side does not know.
    pub async fn list(&self, filter: ListFilter) -> Result<ListOutcome> {
        let remote = self.authority.list(&filter.remote()).await;
        let remote_listed = remote.is_some();
        let remote = remote.unwrap_or_default();

        let mut local: Vec<StoredRecord> = Vec::new();
        if let Some(mirror) = &self.mirror {
            for shelf in filter.shelves() {
                local.extend(mirror.list_shelf(*shelf)?);
            }
        }

        let api_ids: HashSet<&str> = remote.iter().map(|r| r.request_id.as_str()).collect();
        let mut entries: Vec<ListEntry> = remote
            .iter()
            .map(|r| ListEntry::from_record(r, RecordSource::Api, true))
            .collect();

        for stored in &local {
            let record = &stored.record;
            if record.request_id.is_empty() || api_ids.contains(record.request_id.as_str()) {
                continue;
            }
            if !filter.matches(record.status()) {
                continue;
            }

            if remote_listed && record.api_synced {
                // Known remotely but filtered out there: its remote state moved on.
                match self.fetch(&record.request_id).await {
                    Ok(view) if filter.matches(view.status()) => entries.push(ListEntry::from_record(
                        &view.record,
                        view.source,
                        view.record.api_synced,
                    )),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(request_id = %record.request_id, error = %e, "Could not reconcile listed request");
                    }
                }
                continue;
            }

            entries.push(ListEntry::from_record(
                record,
                RecordSource::LocalOnly,
                record.api_synced,
            ));
        }

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let pending_count = entries
            .iter()
            .filter(|e| e.status == RequestStatus::Pending)
            .count();

        Ok(ListOutcome {
            total_count: entries.len(),
            pending_count,
            api_available: self.authority.is_available(),
            requests: entries,
        })
    }

    // =========================================================================
    // decide
    // =========================================================================

    /// Record a decision. `decision` is `approved`, `rejected`, or any
    /// status the request may legally move to next.
    pub async fn decide(
        &self,
        request_id: &str,
        decision: &str,
        comment: &str,
        decided_by: &str,
    ) -> Result<DecideOutcome> {
        let status = decision_status(decision)?;
        let decision = Decision::for_status(status).ok_or_else(|| {
            Error::Validation(format!("Invalid decision: {status} is not a decision"))
        })?;

        let current = self.fetch(request_id).await?;
        let previous = current.status();
        if !previous.can_transition_to(status) {
            return Err(Error::Validation(format!(
                "Request {request_id} cannot move from {previous} to {status}"
            )));
        }

        let now = Utc::now();
        let patch = DecisionPatch {
            status,
            decision,
            decision_comment: comment.to_string(),
            decided_by: decided_by.to_string(),
            decided_at: now,
            updated_at: now,
        };

        let api_synced = self.authority.update(request_id, &patch).await.is_some();

        let has_local_copy = current.shelf.is_some();
        match (&self.mirror, has_local_copy) {
            (Some(mirror), true) => {
                let mut record = current.record.clone();
                record.apply_patch(&patch);
                record.api_synced = api_synced;
                if let Err(e) = mirror.save(request_id, &record, !status.is_terminal()) {
                    if !api_synced {
                        return Err(e);
                    }
                    tracing::warn!(request_id, error = %e, "Mirror update failed, remote holds the decision");
                }
            }
            _ if !api_synced => {
                return Err(self
                    .remote_failure("record decision")
                    .with_context(format!("Request {request_id} has no local copy")));
            }
            _ => {}
        }

        tracing::info!(
            request_id,
            from = %previous,
            to = %status,
            decided_by,
            api_synced,
            "Governance decision recorded"
        );

        let requester = current.record.requester.as_deref().unwrap_or("unknown");
        let operation = current.record.operation_kind().unwrap_or("unknown");
        let agent = current.record.target_name().unwrap_or("unknown");
        let notification_sent = self
            .notifier
            .send(&Notification {
                to: requester.to_string(),
                subject: format!(
                    "[GOVERNANCE {}] {operation}: {agent}",
                    decision.as_str().to_uppercase()
                ),
                kind: NotificationKind::GovernanceResponse,
                message: format!(
                    "GovernanceRequest {decision}.\n\n\
                     Request ID: {request_id}\n\
                     Decision: {}\n\
                     Comment: {comment}\n\
                     Decided by: {decided_by}",
                    decision.as_str().to_uppercase()
                ),
                request_id: request_id.to_string(),
                priority: Priority::High,
            })
            .await;

        Ok(DecideOutcome {
            request_id: request_id.to_string(),
            decision,
            api_status: status,
            previous_status: previous,
            comment: comment.to_string(),
            decided_by: decided_by.to_string(),
            api_synced,
            notification_sent,
        })
    }

    // =========================================================================
    // wait
    // =========================================================================

    /// Poll until the request is decided, the timeout passes, or `cancel` fires.
    pub async fn wait(
        &self,
        request_id: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<WaitOutcome> {
        let mut schedule = PollSchedule::new(self.settings.poll_interval, timeout, cancel);

        let initial = self.fetch(request_id).await?;
        if initial.status().is_decided() {
            return Ok(WaitOutcome::Decided {
                view: initial,
                waited_seconds: 0,
            });
        }

        tracing::info!(request_id, timeout_secs = timeout.as_secs(), "Waiting for decision");
        loop {
            match schedule.tick().await {
                Tick::Expired { elapsed } => {
                    tracing::info!(request_id, waited_secs = elapsed.as_secs(), "No decision before timeout");
                    return Ok(WaitOutcome::TimedOut {
                        request_id: request_id.to_string(),
                        waited_seconds: elapsed.as_secs(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                Tick::Cancelled { elapsed } => {
                    return Ok(WaitOutcome::Cancelled {
                        request_id: request_id.to_string(),
                        waited_seconds: elapsed.as_secs(),
                    });
                }
                Tick::Ready => {
                    if self.settings.reconnect
                        && !self.authority.is_available()
                        && self.authority.probe().await
                    {
                        tracing::info!(request_id, "Governance API reachable again");
                    }
                    match self.fetch(request_id).await {
                        Ok(view) if view.status().is_decided() => {
                            return Ok(WaitOutcome::Decided {
                                view,
                                waited_seconds: schedule.elapsed().as_secs(),
                            });
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(request_id, error = %e, "Poll failed, retrying");
                        }
                    }
                }
            }
        }
    }

    // =========================================================================
    // helpers
    // =========================================================================

    pub(crate) fn load_mirror(&self, request_id: &str) -> Result<Option<StoredRecord>> {
        match &self.mirror {
            Some(mirror) => mirror.load(request_id),
            None => Ok(None),
        }
    }

    /// Error for an operation that needed the remote side and did not get it.
    pub(crate) fn remote_failure(&self, op: &str) -> Error {
        if self.authority.is_available() {
            Error::ServiceRejected(format!("Governance API refused to {op}"))
        } else {
            Error::ServiceUnreachable(format!("Governance API unreachable, cannot {op}"))
        }
    }
}

/// Map a decision argument onto the status it moves the request to.
fn decision_status(decision: &str) -> Result<RequestStatus> {
    match decision {
        "approved" => Ok(RequestStatus::LocalApproved),
        "rejected" => Ok(RequestStatus::Rejected),
        other => other.parse::<RequestStatus>().map_err(|_| {
            Error::Validation(format!(
                "Invalid decision: {other}. Use 'approved' or 'rejected'."
            ))
        }),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn build_record(
    input: &NewRequest,
    request_id: String,
    now: DateTime<Utc>,
    settings: &ManagerSettings,
) -> GovernanceRequest {
    let source_cos = non_empty(&input.source_cos)
        .or_else(|| settings.session_name.clone())
        .unwrap_or_else(|| input.requester.clone());

    GovernanceRequest {
        request_id,
        request_type: Some(input.operation_type.clone()),
        operation: Some(Operation {
            action: input.operation_type.clone(),
            target: input.agent.clone(),
            parameters: Default::default(),
        }),
        justification: Some(input.reason.clone()),
        requester: Some(input.requester.clone()),
        source_cos: Some(source_cos),
        source_manager: Some(non_empty(&input.source_manager).unwrap_or_default()),
        target_cos: Some(non_empty(&input.target_cos).unwrap_or_default()),
        target_manager: Some(non_empty(&input.target_manager).unwrap_or_default()),
        scope: Some(input.scope),
        impact: Some(Impact {
            scope: Some(input.scope),
            risk_level: Some(input.risk),
        }),
        status: Some(RequestStatus::Pending),
        created_at: Some(now),
        updated_at: Some(now),
        decision: None,
        decision_comment: None,
        decided_by: None,
        decided_at: None,
        api_synced: false,
        operation_type: Some(input.operation_type.clone()),
        agent_name: Some(input.agent.clone()),
        reason: Some(input.reason.clone()),
        extra: Default::default(),
    }
}
