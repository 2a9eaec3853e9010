use crate::conflict::{AvailabilitySlot, TEACHING_DAYS};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::timegrid::Interval;
use rusqlite::OptionalExtension;
use serde_json::json;
use std::collections::HashSet;

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let teacher_id = match req.params.get("teacherId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing teacherId", None),
    };

    let slots = match db::load_availability(conn, Some(&teacher_id)) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match serde_json::to_value(&slots) {
        Ok(v) => ok(&req.id, json!({ "slots": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Parse and validate the full weekly grid sent by the availability editor.
/// The grid is a replace-all write: at most one row per day, well-formed
/// half-open ranges, days in 1..=6.
fn parse_slots(
    teacher_id: &str,
    raw: &serde_json::Value,
) -> Result<Vec<AvailabilitySlot>, String> {
    let Some(arr) = raw.as_array() else {
        return Err("slots must be an array".to_string());
    };
    let mut seen_days: HashSet<u8> = HashSet::new();
    let mut slots = Vec::with_capacity(arr.len());
    for v in arr {
        let mut slot: AvailabilitySlot = serde_json::from_value(v.clone())
            .map_err(|e| format!("invalid slot: {e}"))?;
        slot.teacher_id = teacher_id.to_string();
        if slot.day_of_week < 1 || slot.day_of_week > TEACHING_DAYS {
            return Err(format!(
                "dayOfWeek must be in 1..={}, got {}",
                TEACHING_DAYS, slot.day_of_week
            ));
        }
        if !seen_days.insert(slot.day_of_week) {
            return Err(format!("duplicate dayOfWeek {}", slot.day_of_week));
        }
        if Interval::parse(&slot.start_time, &slot.end_time).is_none() {
            return Err(format!(
                "invalid time range {}-{} on day {}",
                slot.start_time, slot.end_time, slot.day_of_week
            ));
        }
        slots.push(slot);
    }
    Ok(slots)
}

fn handle_replace(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let teacher_id = match req.params.get("teacherId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing teacherId", None),
    };
    let Some(raw_slots) = req.params.get("slots") else {
        return err(&req.id, "bad_params", "missing slots", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [&teacher_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "teacher not found", None);
    }

    let slots = match parse_slots(&teacher_id, raw_slots) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    if let Err(e) = db::replace_availability(conn, &teacher_id, &slots) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "teacher_availability" })),
        );
    }

    ok(&req.id, json!({ "ok": true, "slotCount": slots.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "availability.get" => Some(handle_get(state, req)),
        "availability.replace" => Some(handle_replace(state, req)),
        _ => None,
    }
}
