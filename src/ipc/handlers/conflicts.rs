use crate::conflict::{
    detect_availability_conflicts, detect_schedule_conflicts, sort_conflicts, Conflict,
    ConflictKind,
};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::resolve::{plan_resolution, ResolutionPlan};
use rusqlite::Connection;
use serde_json::json;

fn conflict_to_json(c: &Conflict) -> serde_json::Value {
    let mut v = serde_json::to_value(c).unwrap_or_else(|_| json!({}));
    v["autoResolvable"] = json!(c.auto_resolvable());
    v
}

/// Run both detector variants over a fresh snapshot and return one merged,
/// deterministically ordered list.
fn handle_detect(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let teachers = match db::load_teachers(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let availability = match db::load_availability(conn, None) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let constraints = match db::load_constraints(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let entries = match db::load_schedule(conn, None) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut conflicts = detect_availability_conflicts(&teachers, &availability, &constraints);
    conflicts.extend(detect_schedule_conflicts(&teachers, &entries, &availability));
    sort_conflicts(&mut conflicts);

    let out: Vec<_> = conflicts.iter().map(conflict_to_json).collect();
    ok(
        &req.id,
        json!({ "conflicts": out, "conflictCount": out.len() }),
    )
}

enum Outcome {
    Resolved { conflict_id: String, message: String },
    Failed { conflict_id: String, reason: String },
}

/// Apply the deterministic remediation for one conflict. Only workload
/// conflicts are actionable; everything else reports a manual-resolution
/// failure, matching what `autoResolvable` already told the UI.
fn resolve_one(conn: &Connection, conflict: &Conflict) -> anyhow::Result<Outcome> {
    let teacher_id = match &conflict.kind {
        ConflictKind::WorkloadExcess { teacher_id, .. }
        | ConflictKind::WorkloadUnderuse { teacher_id, .. } => teacher_id.clone(),
        _ => {
            return Ok(Outcome::Failed {
                conflict_id: conflict.id.clone(),
                reason: "requires manual resolution".to_string(),
            })
        }
    };

    let slots = db::load_availability(conn, Some(&teacher_id))?;
    match plan_resolution(conflict, &slots) {
        ResolutionPlan::ReplaceAvailability {
            teacher_id,
            slots,
            message,
        } => {
            db::replace_availability(conn, &teacher_id, &slots)?;
            Ok(Outcome::Resolved {
                conflict_id: conflict.id.clone(),
                message,
            })
        }
        ResolutionPlan::NoChange { message, .. } => Ok(Outcome::Failed {
            conflict_id: conflict.id.clone(),
            reason: message,
        }),
        ResolutionPlan::Manual => Ok(Outcome::Failed {
            conflict_id: conflict.id.clone(),
            reason: "requires manual resolution".to_string(),
        }),
    }
}

fn parse_conflict(v: &serde_json::Value) -> Result<Conflict, String> {
    serde_json::from_value(v.clone()).map_err(|e| format!("invalid conflict: {e}"))
}

fn handle_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(raw) = req.params.get("conflict") else {
        return err(&req.id, "bad_params", "missing conflict", None);
    };
    let conflict = match parse_conflict(raw) {
        Ok(c) => c,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    match resolve_one(conn, &conflict) {
        Ok(Outcome::Resolved { conflict_id, message }) => ok(
            &req.id,
            json!({
                "success": true,
                "message": message,
                "resolvedConflicts": [conflict_id],
                "failedResolutions": []
            }),
        ),
        Ok(Outcome::Failed { conflict_id, reason }) => ok(
            &req.id,
            json!({
                "success": false,
                "message": reason.clone(),
                "resolvedConflicts": [],
                "failedResolutions": [{ "conflictId": conflict_id, "reason": reason }]
            }),
        ),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

/// Resolve every auto-resolvable conflict in the submitted list,
/// sequentially. No cross-conflict rollback: each resolution is its own
/// transaction, and a failure is reported, not unwound.
fn handle_resolve_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(arr) = req.params.get("conflicts").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing/invalid conflicts", None);
    };

    let mut conflicts: Vec<Conflict> = Vec::with_capacity(arr.len());
    for v in arr {
        match parse_conflict(v) {
            Ok(c) => conflicts.push(c),
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        }
    }

    let mut resolved: Vec<serde_json::Value> = Vec::new();
    let mut failed: Vec<serde_json::Value> = Vec::new();
    let mut skipped = 0usize;
    for c in &conflicts {
        if !c.auto_resolvable() {
            skipped += 1;
            continue;
        }
        match resolve_one(conn, c) {
            Ok(Outcome::Resolved { conflict_id, message }) => {
                resolved.push(json!({ "conflictId": conflict_id, "message": message }));
            }
            Ok(Outcome::Failed { conflict_id, reason }) => {
                failed.push(json!({ "conflictId": conflict_id, "reason": reason }));
            }
            Err(e) => {
                failed.push(json!({ "conflictId": c.id, "reason": e.to_string() }));
            }
        }
    }

    ok(
        &req.id,
        json!({
            "success": failed.is_empty(),
            "resolvedCount": resolved.len(),
            "failedCount": failed.len(),
            "skippedCount": skipped,
            "resolvedConflicts": resolved,
            "failedResolutions": failed
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "conflicts.detect" => Some(handle_detect(state, req)),
        "conflicts.resolve" => Some(handle_resolve(state, req)),
        "conflicts.resolveBatch" => Some(handle_resolve_batch(state, req)),
        _ => None,
    }
}
