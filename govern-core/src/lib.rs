//! Govern Core - Dual-authority governance request engine.
//!
//! A governance request lives in two places: the remote governance service,
//! which is authoritative for lifecycle state, and a local YAML mirror that
//! keeps working when the service is down. This crate provides:
//! - The request record and its status state machine
//! - The mirror store (pending / completed shelves)
//! - The remote authority client with a liveness flag
//! - Reconciliation of the two views
//! - The lifecycle manager (create, fetch, list, decide, wait) and bulk sync
//! - Approver/requester notifications

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod authority;
pub mod lifecycle;
pub mod mirror;
pub mod notify;
pub mod poll;
pub mod reconcile;
pub mod record;
pub mod sync;

pub use authority::{Authority, HttpAuthority, RemoteFilter};
pub use lifecycle::{
    CreateOutcome, DecideOutcome, GovernanceManager, ListEntry, ListFilter, ListOutcome,
    ManagerSettings, NewRequest, RequestView, WaitOutcome,
};
pub use mirror::{MirrorStore, Shelf, StoredRecord};
pub use notify::{
    CommandNotifier, DisabledNotifier, Notification, NotificationKind, Notifier, Priority,
};
pub use poll::{PollSchedule, Tick};
pub use reconcile::{merge, reconcile, Reconciled};
pub use record::{
    DecisionPatch, Decision, GovernanceRequest, Impact, Operation, RecordSource, RequestStatus,
    RiskLevel, Scope,
};
pub use sync::SyncOutcome;
