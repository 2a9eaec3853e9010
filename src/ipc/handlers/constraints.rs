use crate::conflict::{blocked_reason, TEACHING_DAYS};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::timegrid::{parse_hhmm, Interval};
use serde_json::{json, Map, Value};
use uuid::Uuid;

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_time(v: &Value, key: &str) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    if parse_hhmm(s).is_none() {
        return Err(format!("{} must be a HH:MM time", key));
    }
    Ok(s.to_string())
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let constraints = match db::load_constraints(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match serde_json::to_value(&constraints) {
        Ok(v) => ok(&req.id, json!({ "constraints": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Patch the singleton work-hours config. Unknown fields are rejected so a
/// UI typo never silently no-ops.
fn config_patch_to_sql(patch: &Map<String, Value>) -> Result<Vec<(String, Value)>, String> {
    let mut cols: Vec<(String, Value)> = Vec::new();
    for (k, v) in patch {
        let (col, value) = match k.as_str() {
            "startTime" => ("start_time", Value::String(parse_time(v, k)?)),
            "endTime" => ("end_time", Value::String(parse_time(v, k)?)),
            "lunchBreakStart" => ("lunch_break_start", Value::String(parse_time(v, k)?)),
            "lunchBreakEnd" => ("lunch_break_end", Value::String(parse_time(v, k)?)),
            "courseDurationMinutes" => (
                "course_duration_minutes",
                Value::from(parse_i64_range(v, k, 15, 240)?),
            ),
            "breakBetweenCoursesMinutes" => (
                "break_between_courses_minutes",
                Value::from(parse_i64_range(v, k, 0, 60)?),
            ),
            "workDays" => ("work_days", Value::from(parse_i64_range(v, k, 1, 6)?)),
            "maxHoursPerDay" => (
                "max_hours_per_day",
                Value::from(parse_i64_range(v, k, 1, 12)?),
            ),
            "maxHoursPerWeek" => (
                "max_hours_per_week",
                Value::from(parse_i64_range(v, k, 1, 60)?),
            ),
            "lunchBreakMandatory" => (
                "lunch_break_mandatory",
                Value::Bool(parse_bool(v, k)?),
            ),
            other => return Err(format!("unknown config field: {other}")),
        };
        cols.push((col.to_string(), value));
    }
    if cols.is_empty() {
        return Err("patch must include at least one field".to_string());
    }
    Ok(cols)
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let cols = match config_patch_to_sql(patch) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    // Loading first guarantees the singleton row exists.
    if let Err(e) = db::load_constraints(conn) {
        return err(&req.id, "db_query_failed", e.to_string(), None);
    }

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind: Vec<rusqlite::types::Value> = Vec::new();
    for (col, value) in cols {
        set_parts.push(format!("{col} = ?"));
        bind.push(match value {
            Value::String(s) => rusqlite::types::Value::Text(s),
            Value::Bool(b) => rusqlite::types::Value::Integer(if b { 1 } else { 0 }),
            Value::Number(n) => rusqlite::types::Value::Integer(n.as_i64().unwrap_or(0)),
            _ => rusqlite::types::Value::Null,
        });
    }
    set_parts.push("updated_at = ?".into());
    bind.push(rusqlite::types::Value::Text(db::now_iso()));

    let sql = format!("UPDATE work_hours_config SET {}", set_parts.join(", "));
    if let Err(e) = conn.execute(&sql, rusqlite::params_from_iter(bind)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "work_hours_config" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

/// Full-replace write for the breaks list, mirroring the save action in the
/// constraints editor. One transaction; a bad row aborts the whole save.
fn handle_breaks_replace(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(arr) = req.params.get("breaks").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing/invalid breaks", None);
    };

    struct Parsed {
        name: String,
        start: String,
        end: String,
        duration: i64,
    }
    let mut parsed: Vec<Parsed> = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(name) = v.get("name").and_then(|x| x.as_str()) else {
            return err(&req.id, "bad_params", "break missing name", None);
        };
        let name = name.trim().to_string();
        if name.is_empty() {
            return err(&req.id, "bad_params", "break name must not be empty", None);
        }
        let start = match v.get("startTime").and_then(|x| x.as_str()) {
            Some(s) => s.to_string(),
            None => return err(&req.id, "bad_params", "break missing startTime", None),
        };
        let end = match v.get("endTime").and_then(|x| x.as_str()) {
            Some(s) => s.to_string(),
            None => return err(&req.id, "bad_params", "break missing endTime", None),
        };
        let Some(iv) = Interval::parse(&start, &end) else {
            return err(
                &req.id,
                "bad_params",
                format!("invalid break range {start}-{end}"),
                None,
            );
        };
        parsed.push(Parsed {
            name,
            start,
            end,
            duration: iv.duration_minutes() as i64,
        });
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM breaks", []) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    let now = db::now_iso();
    for p in &parsed {
        if let Err(e) = tx.execute(
            "INSERT INTO breaks(id, name, start_time, end_time, duration_minutes, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &p.name,
                &p.start,
                &p.end,
                p.duration,
                &now,
                &now,
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "breaks" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true, "breakCount": parsed.len() }))
}

fn handle_blocked_replace(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(arr) = req.params.get("blockedSlots").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing/invalid blockedSlots", None);
    };

    struct Parsed {
        day: i64,
        start: String,
        end: String,
        reason: String,
    }
    let mut parsed: Vec<Parsed> = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(day) = v.get("dayOfWeek").and_then(|x| x.as_i64()) else {
            return err(&req.id, "bad_params", "blocked slot missing dayOfWeek", None);
        };
        if !(1..=TEACHING_DAYS as i64).contains(&day) {
            return err(
                &req.id,
                "bad_params",
                format!("dayOfWeek must be in 1..={}", TEACHING_DAYS),
                None,
            );
        }
        let start = match v.get("startTime").and_then(|x| x.as_str()) {
            Some(s) => s.to_string(),
            None => return err(&req.id, "bad_params", "blocked slot missing startTime", None),
        };
        let end = match v.get("endTime").and_then(|x| x.as_str()) {
            Some(s) => s.to_string(),
            None => return err(&req.id, "bad_params", "blocked slot missing endTime", None),
        };
        if Interval::parse(&start, &end).is_none() {
            return err(
                &req.id,
                "bad_params",
                format!("invalid blocked range {start}-{end}"),
                None,
            );
        }
        let reason = v
            .get("reason")
            .and_then(|x| x.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if reason.is_empty() {
            return err(&req.id, "bad_params", "blocked slot needs a reason", None);
        }
        parsed.push(Parsed { day, start, end, reason });
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM blocked_time_slots", []) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    let now = db::now_iso();
    for p in &parsed {
        if let Err(e) = tx.execute(
            "INSERT INTO blocked_time_slots(id, day_of_week, start_time, end_time, reason, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                p.day,
                &p.start,
                &p.end,
                &p.reason,
                &now,
                &now,
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "blocked_time_slots" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "ok": true, "blockedSlotCount": parsed.len() }),
    )
}

/// The scheduling grid asks whether a candidate slot is blocked school-wide
/// before offering it for placement.
fn handle_check_slot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(day) = req.params.get("dayOfWeek").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing dayOfWeek", None);
    };
    if !(1..=TEACHING_DAYS as i64).contains(&day) {
        return err(
            &req.id,
            "bad_params",
            format!("dayOfWeek must be in 1..={}", TEACHING_DAYS),
            None,
        );
    }
    let start = req.params.get("startTime").and_then(|v| v.as_str());
    let end = req.params.get("endTime").and_then(|v| v.as_str());
    let (Some(start), Some(end)) = (start, end) else {
        return err(&req.id, "bad_params", "missing startTime/endTime", None);
    };
    let Some(iv) = Interval::parse(start, end) else {
        return err(
            &req.id,
            "bad_params",
            format!("invalid time range {start}-{end}"),
            None,
        );
    };

    let constraints = match db::load_constraints(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let reason = blocked_reason(day as u8, iv, &constraints);
    ok(
        &req.id,
        json!({ "blocked": reason.is_some(), "reason": reason }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "constraints.get" => Some(handle_get(state, req)),
        "constraints.update" => Some(handle_update(state, req)),
        "constraints.breaks.replace" => Some(handle_breaks_replace(state, req)),
        "constraints.blockedSlots.replace" => Some(handle_blocked_replace(state, req)),
        "constraints.checkSlot" => Some(handle_check_slot(state, req)),
        _ => None,
    }
}
