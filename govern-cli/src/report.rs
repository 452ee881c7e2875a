//! JSON result documents printed by the CLI.
//!
//! Every document carries a `success` flag; the process exit code mirrors it.

use govern_common::Error;
use govern_core::{
    CreateOutcome, DecideOutcome, ListOutcome, RequestView, SyncOutcome, WaitOutcome,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Attach `success` to a serializable outcome.
fn with_success<T: Serialize>(outcome: &T, success: bool) -> Value {
    let mut doc = match serde_json::to_value(outcome) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            let mut map = Map::new();
            map.insert("result".into(), other);
            map
        }
        Err(e) => return failure_message(&format!("Failed to encode result: {e}"), "serialization"),
    };
    doc.insert("success".into(), Value::Bool(success));
    Value::Object(doc)
}

pub fn created(outcome: &CreateOutcome) -> Value {
    with_success(outcome, true)
}

pub fn status(view: &RequestView) -> Value {
    let record = &view.record;
    json!({
        "success": true,
        "request_id": record.request_id,
        "status": record.status(),
        "operation_type": record.operation_kind(),
        "agent_name": record.target_name().unwrap_or_default(),
        "reason": record.reason_text().unwrap_or_default(),
        "requester": record.requester,
        "created_at": record.created_at,
        "decision": record.decision,
        "decision_comment": record.decision_comment,
        "decided_by": record.decided_by,
        "decided_at": record.decided_at,
        "scope": record.scope.unwrap_or_default(),
        "risk_level": record.risk_level(),
        "api_synced": record.api_synced,
        "_source": view.source,
        "_location": view.shelf,
    })
}

pub fn listed(outcome: &ListOutcome) -> Value {
    with_success(outcome, true)
}

pub fn decided(outcome: &DecideOutcome) -> Value {
    with_success(outcome, true)
}

pub fn waited(outcome: &WaitOutcome) -> Value {
    match outcome {
        WaitOutcome::Decided {
            view,
            waited_seconds,
        } => json!({
            "success": true,
            "request_id": view.record.request_id,
            "status": view.status(),
            "decision": view.record.decision,
            "decision_comment": view.record.decision_comment,
            "decided_by": view.record.decided_by,
            "waited_seconds": waited_seconds,
        }),
        WaitOutcome::TimedOut {
            request_id,
            waited_seconds,
            timeout_secs,
        } => json!({
            "success": false,
            "request_id": request_id,
            "status": "timeout",
            "waited_seconds": waited_seconds,
            "message": format!("No decision within {timeout_secs}s"),
        }),
        WaitOutcome::Cancelled {
            request_id,
            waited_seconds,
        } => json!({
            "success": false,
            "request_id": request_id,
            "status": "cancelled",
            "waited_seconds": waited_seconds,
            "message": "Wait cancelled",
        }),
    }
}

pub fn synced(outcome: &SyncOutcome) -> Value {
    with_success(outcome, outcome.success())
}

pub fn failure(error: &Error) -> Value {
    failure_message(&error.to_string(), error.kind())
}

/// Failure before any engine call, while loading or validating configuration.
pub fn config_failure(message: &str) -> Value {
    failure_message(message, "config")
}

fn failure_message(message: &str, kind: &str) -> Value {
    json!({
        "success": false,
        "error": message,
        "error_kind": kind,
    })
}

/// Exit code for a document: 0 when it reports success.
pub fn exit_code(doc: &Value) -> i32 {
    match doc.get("success").and_then(Value::as_bool) {
        Some(false) => 1,
        _ => 0,
    }
}
