//! Reconciliation of the remote and mirror views of a request.
//!
//! The remote service is authoritative only for lifecycle and decision
//! fields. Everything else comes from the mirror, which is the richer record
//! because the remote side may trim descriptive fields.

use crate::record::{GovernanceRequest, RecordSource, RequestStatus};

/// Result of merging the two views.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub record: GovernanceRequest,
    pub source: RecordSource,
}

impl Reconciled {
    /// Neither store held the record.
    pub fn is_empty(&self) -> bool {
        self.source == RecordSource::None
    }

    /// Both stores held the record and the mirror should be re-persisted.
    pub fn is_merged(&self) -> bool {
        self.source == RecordSource::Merged
    }

    /// The record carries the remote authoritative fields over a mirror copy.
    pub fn takes_remote(&self) -> bool {
        matches!(self.source, RecordSource::Merged | RecordSource::Conflict)
    }
}

/// Merge a remote record and a mirror record into one view.
///
/// When both exist, the mirror is the base and each authoritative field is
/// overwritten by the remote value wherever the remote value is present.
pub fn merge(remote: Option<&GovernanceRequest>, mirror: Option<&GovernanceRequest>) -> Reconciled {
    match (remote, mirror) {
        (None, None) => Reconciled {
            record: GovernanceRequest::default(),
            source: RecordSource::None,
        },
        (None, Some(mirror)) => Reconciled {
            record: mirror.clone(),
            source: RecordSource::LocalOnly,
        },
        (Some(remote), None) => Reconciled {
            record: remote.clone(),
            source: RecordSource::ApiOnly,
        },
        (Some(remote), Some(mirror)) => {
            let mut record = mirror.clone();
            overwrite_authoritative(&mut record, remote);
            record.api_synced = true;
            Reconciled {
                record,
                source: RecordSource::Merged,
            }
        }
    }
}

fn overwrite_authoritative(target: &mut GovernanceRequest, remote: &GovernanceRequest) {
    fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
        if value.is_some() {
            slot.clone_from(value);
        }
    }

    take(&mut target.status, &remote.status);
    take(&mut target.decision, &remote.decision);
    take(&mut target.decided_by, &remote.decided_by);
    take(&mut target.decided_at, &remote.decided_at);
    take(&mut target.decision_comment, &remote.decision_comment);
    take(&mut target.updated_at, &remote.updated_at);
}

/// Merge that accounts for decisions the mirror has not synced yet.
///
/// An unsynced mirror decision survives only while the remote copy is still
/// pending and the decision is a legal move from there (`LocalAhead`). Any
/// other disagreement between two decided copies resolves to the remote
/// fields (`Conflict`). Everything else is a plain [`merge`].
pub fn reconcile(
    remote: Option<&GovernanceRequest>,
    mirror: Option<&GovernanceRequest>,
) -> Reconciled {
    let (Some(remote_record), Some(mirror_record)) = (remote, mirror) else {
        return merge(remote, mirror);
    };
    let (remote_status, local_status) = (remote_record.status(), mirror_record.status());
    if mirror_record.api_synced || remote_status == local_status || !local_status.is_decided() {
        return merge(remote, mirror);
    }

    if remote_status == RequestStatus::Pending && remote_status.can_transition_to(local_status) {
        return Reconciled {
            record: mirror_record.clone(),
            source: RecordSource::LocalAhead,
        };
    }

    Reconciled {
        source: RecordSource::Conflict,
        ..merge(remote, mirror)
    }
}
