//! Governance request record model and status state machine.
//!
//! A [`GovernanceRequest`] is deliberately tolerant: every field except the id
//! may be missing, because the remote service is free to trim descriptive
//! fields and older mirror files predate some of them. Keys this model does not
//! know are kept verbatim in [`GovernanceRequest::extra`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use govern_common::Error;
use serde::{Deserialize, Serialize};

/// Prefix marking local-only annotation keys that are never persisted or sent.
pub const ANNOTATION_PREFIX: char = '_';

/// Status of a governance request.
///
/// ```text
/// pending ─┬─> local-approved ──┬─> dual-approved ─> executed
///          ├─> remote-approved ─┤
///          ├─> dual-approved    └─> executed
///          └─> rejected
/// ```
///
/// Only a pending request can be rejected; an approval is never revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    #[default]
    Pending,
    LocalApproved,
    RemoteApproved,
    DualApproved,
    Executed,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        Self::Pending,
        Self::LocalApproved,
        Self::RemoteApproved,
        Self::DualApproved,
        Self::Executed,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::LocalApproved => "local-approved",
            Self::RemoteApproved => "remote-approved",
            Self::DualApproved => "dual-approved",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Rejected)
    }

    /// Statuses that count as "approved" for generic callers.
    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            Self::LocalApproved | Self::RemoteApproved | Self::DualApproved | Self::Executed
        )
    }

    /// A decision has been reached (approved in any form, or terminal).
    pub fn is_decided(&self) -> bool {
        self.is_approved() || self.is_terminal()
    }

    /// Whether `next` is a legal forward move from this status.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        match self {
            Pending => matches!(next, LocalApproved | RemoteApproved | DualApproved | Rejected),
            LocalApproved | RemoteApproved => matches!(next, DualApproved | Executed),
            DualApproved => next == Executed,
            Executed | Rejected => false,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Unknown status: {s}")))
    }
}

/// Final decision recorded on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// The decision implied by reaching `status`, if any.
    pub fn for_status(status: RequestStatus) -> Option<Self> {
        if status == RequestStatus::Rejected {
            Some(Self::Rejected)
        } else if status.is_approved() {
            Some(Self::Approved)
        } else {
            None
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk level for operations requiring approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical requests are routed with high priority.
    pub fn is_elevated(&self) -> bool {
        *self >= Self::High
    }
}

impl FromStr for RiskLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(Error::Validation(format!("Unknown risk level: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    #[default]
    Local,
    CrossTeam,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::CrossTeam => "cross-team",
        }
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "cross-team" => Ok(Self::CrossTeam),
            other => Err(Error::Validation(format!("Unknown scope: {other}"))),
        }
    }
}

/// Which store(s) a reported record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordSource {
    None,
    LocalOnly,
    ApiOnly,
    Merged,
    Api,
    /// Both stores hold it; the remote copy is still pending and the mirror
    /// carries a decision the remote side has not seen yet.
    LocalAhead,
    /// Both stores hold it with different decisions; the remote one wins.
    Conflict,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::LocalOnly => "local-only",
            Self::ApiOnly => "api-only",
            Self::Merged => "merged",
            Self::Api => "api",
            Self::LocalAhead => "local-ahead",
            Self::Conflict => "conflict",
        }
    }
}

/// The action being requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
}

/// A governance request as held by either store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceRequest {
    #[serde(default)]
    pub request_id: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,

    #[serde(default)]
    pub justification: Option<String>,

    #[serde(default)]
    pub requester: Option<String>,

    #[serde(default)]
    pub source_cos: Option<String>,
    #[serde(default)]
    pub source_manager: Option<String>,
    #[serde(default)]
    pub target_cos: Option<String>,
    #[serde(default)]
    pub target_manager: Option<String>,

    #[serde(default)]
    pub scope: Option<Scope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<Impact>,

    #[serde(default)]
    pub status: Option<RequestStatus>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub decision_comment: Option<String>,
    #[serde(default)]
    pub decided_by: Option<String>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,

    /// Whether the remote store has accepted this exact record.
    #[serde(default)]
    pub api_synced: bool,

    // Older field names, still written for readers that predate `type`/`operation`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Unrecognized keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl GovernanceRequest {
    /// Effective status; a record that never carried one is pending.
    pub fn status(&self) -> RequestStatus {
        self.status.unwrap_or_default()
    }

    /// Operation type, preferring `type` over the legacy `operation_type`.
    pub fn operation_kind(&self) -> Option<&str> {
        self.request_type
            .as_deref()
            .or(self.operation_type.as_deref())
    }

    /// Target agent or resource, preferring the legacy `agent_name`.
    pub fn target_name(&self) -> Option<&str> {
        self.agent_name
            .as_deref()
            .or_else(|| self.operation.as_ref().map(|op| op.target.as_str()))
    }

    /// Reason text, preferring the legacy `reason` over `justification`.
    pub fn reason_text(&self) -> Option<&str> {
        self.reason.as_deref().or(self.justification.as_deref())
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.impact
            .as_ref()
            .and_then(|impact| impact.risk_level)
            .unwrap_or_default()
    }

    /// Drop `_`-prefixed annotation keys before the record leaves this process.
    pub fn strip_annotations(&mut self) {
        self.extra
            .retain(|key, _| !key.starts_with(ANNOTATION_PREFIX));
    }

    /// Copy of the record with annotations removed.
    pub fn without_annotations(&self) -> Self {
        let mut clean = self.clone();
        clean.strip_annotations();
        clean
    }

    /// Apply a decision patch to every authoritative field it carries.
    pub fn apply_patch(&mut self, patch: &DecisionPatch) {
        self.status = Some(patch.status);
        self.decision = Some(patch.decision);
        self.decision_comment = Some(patch.decision_comment.clone());
        self.decided_by = Some(patch.decided_by.clone());
        self.decided_at = Some(patch.decided_at);
        self.updated_at = Some(patch.updated_at);
    }
}

/// Partial update sent to the remote service by a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPatch {
    pub status: RequestStatus,
    pub decision: Decision,
    pub decision_comment: String,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DecisionPatch {
    /// Rebuild the patch a decided record carries, for replaying it to the remote side.
    pub fn from_record(record: &GovernanceRequest) -> Option<Self> {
        let decided_at = record.decided_at?;
        Some(Self {
            status: record.status?,
            decision: record.decision?,
            decision_comment: record.decision_comment.clone().unwrap_or_default(),
            decided_by: record.decided_by.clone()?,
            decided_at,
            updated_at: record.updated_at.unwrap_or(decided_at),
        })
    }
}

/// Generate an id in the `GR-<YYYYmmddHHMMSS>-<8 hex>` format.
pub fn new_request_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("GR-{}-{}", now.format("%Y%m%d%H%M%S"), &suffix[..8])
}
