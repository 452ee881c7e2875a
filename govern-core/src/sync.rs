//! Bulk push of unsynced mirror records to the remote authority.

use govern_common::{Error, Result};
use serde::Serialize;

use crate::lifecycle::GovernanceManager;
use crate::mirror::{Shelf, StoredRecord};
use crate::reconcile::reconcile;
use crate::record::{DecisionPatch, RecordSource};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub synced: usize,
    pub failed: usize,
    pub already_synced: usize,
    pub api_available: bool,
}

impl SyncOutcome {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

impl GovernanceManager {
    /// Push every mirror record the remote side has not accepted yet.
    ///
    /// Individual failures are counted and never abort the batch.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        if !self.authority.is_available() && !self.authority.probe().await {
            return Err(Error::ServiceUnreachable(
                "API unreachable, cannot sync".into(),
            ));
        }

        let mut outcome = SyncOutcome {
            api_available: true,
            ..SyncOutcome::default()
        };
        let Some(mirror) = &self.mirror else {
            return Ok(outcome);
        };

        for shelf in [Shelf::Pending, Shelf::Completed] {
            for stored in mirror.list_shelf(shelf)? {
                if stored.record.request_id.is_empty() {
                    continue;
                }
                if stored.record.api_synced {
                    outcome.already_synced += 1;
                    continue;
                }

                match self.sync_one(&stored).await {
                    Ok(()) => outcome.synced += 1,
                    Err(e) => {
                        tracing::warn!(request_id = %stored.record.request_id, error = %e, "Sync failed");
                        outcome.failed += 1;
                    }
                }
            }
        }

        outcome.api_available = self.authority.is_available();
        tracing::info!(
            synced = outcome.synced,
            failed = outcome.failed,
            already_synced = outcome.already_synced,
            "Sync finished"
        );
        Ok(outcome)
    }

    async fn sync_one(&self, stored: &StoredRecord) -> Result<()> {
        let Some(mirror) = &self.mirror else {
            return Ok(());
        };
        let local = &stored.record;
        let request_id = local.request_id.as_str();

        let mut record = match self.authority.fetch(request_id).await {
            Some(remote) => {
                let reconciled = reconcile(Some(&remote), Some(local));
                match reconciled.source {
                    RecordSource::LocalAhead => {
                        let patch = DecisionPatch::from_record(local).ok_or_else(|| {
                            Error::Validation(format!(
                                "Request {request_id} has no decision to push"
                            ))
                        })?;
                        if self.authority.update(request_id, &patch).await.is_none() {
                            return Err(self.remote_failure("push decision"));
                        }
                        tracing::info!(request_id, status = %local.status(), "Pushed local decision");
                    }
                    RecordSource::Conflict => tracing::warn!(
                        request_id,
                        local = %local.status(),
                        remote = %remote.status(),
                        "Dropping local decision, remote already decided"
                    ),
                    _ => {}
                }
                reconciled.record
            }
            None if !self.authority.is_available() => {
                return Err(self.remote_failure("sync request"));
            }
            None => {
                let clean = local.without_annotations();
                if self.authority.submit(&clean).await.is_none() {
                    return Err(self.remote_failure("submit request"));
                }
                tracing::info!(request_id, "Submitted local-only request");
                local.clone()
            }
        };

        record.api_synced = true;
        mirror.save(request_id, &record, !record.status().is_terminal())?;
        Ok(())
    }
}
