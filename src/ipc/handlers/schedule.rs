use crate::conflict::{ScheduleEntry, TEACHING_DAYS};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::timegrid::Interval;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = req.params.get("classId").and_then(|v| v.as_str());

    let entries = match db::load_schedule(conn, class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match serde_json::to_value(&entries) {
        Ok(v) => ok(&req.id, json!({ "entries": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Replace one class's timetable. The scheduling grid saves whole class
/// timetables, never single entries, so the write is a transactional
/// delete-then-insert scoped to the class.
fn handle_replace(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let Some(arr) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing/invalid entries", None);
    };

    let mut entries: Vec<ScheduleEntry> = Vec::with_capacity(arr.len());
    for v in arr {
        let mut entry: ScheduleEntry = match serde_json::from_value(v.clone()) {
            Ok(e) => e,
            Err(e) => return err(&req.id, "bad_params", format!("invalid entry: {e}"), None),
        };
        entry.class_id = class_id.clone();
        if entry.day_of_week < 1 || entry.day_of_week > TEACHING_DAYS {
            return err(
                &req.id,
                "bad_params",
                format!("dayOfWeek must be in 1..={}", TEACHING_DAYS),
                None,
            );
        }
        if Interval::parse(&entry.start_time, &entry.end_time).is_none() {
            return err(
                &req.id,
                "bad_params",
                format!("invalid time range {}-{}", entry.start_time, entry.end_time),
                None,
            );
        }
        let teacher_exists: Option<i64> = match conn
            .query_row(
                "SELECT 1 FROM teachers WHERE id = ?",
                [&entry.teacher_id],
                |r| r.get(0),
            )
            .optional()
        {
            Ok(x) => x,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if teacher_exists.is_none() {
            return err(
                &req.id,
                "not_found",
                format!("teacher {} not found", entry.teacher_id),
                None,
            );
        }
        entries.push(entry);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM schedule_entries WHERE class_id = ?", [&class_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "schedule_entries" })),
        );
    }
    let now = db::now_iso();
    let mut inserted_ids: Vec<String> = Vec::with_capacity(entries.len());
    for e in &entries {
        let id = Uuid::new_v4().to_string();
        if let Err(e2) = tx.execute(
            "INSERT INTO schedule_entries(
               id, class_id, subject_id, teacher_id, day_of_week, start_time, end_time, room_id,
               created_at, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &e.class_id,
                &e.subject_id,
                &e.teacher_id,
                e.day_of_week as i64,
                &e.start_time,
                &e.end_time,
                e.room_id.as_deref(),
                &now,
                &now,
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e2.to_string(),
                Some(json!({ "table": "schedule_entries" })),
            );
        }
        inserted_ids.push(id);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "ok": true, "entryIds": inserted_ids }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.list" => Some(handle_list(state, req)),
        "schedule.replace" => Some(handle_replace(state, req)),
        _ => None,
    }
}
