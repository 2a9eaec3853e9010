use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "teachers": [] }));
    };

    // Include availability-row counts so the roster view can flag teachers
    // with no saved grid.
    let mut stmt = match conn.prepare(
        "SELECT
           t.id,
           t.name,
           t.subject,
           (SELECT COUNT(*) FROM teacher_availability a WHERE a.teacher_id = t.id) AS slot_count
         FROM teachers t
         ORDER BY t.name, t.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let subject: Option<String> = row.get(2)?;
            let slot_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "subject": subject,
                "availabilitySlotCount": slot_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(teachers) => ok(&req.id, json!({ "teachers": teachers })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let subject = req
        .params
        .get("subject")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .and_then(|s| if s.is_empty() { None } else { Some(s) });

    let teacher_id = Uuid::new_v4().to_string();
    let now = db::now_iso();
    if let Err(e) = conn.execute(
        "INSERT INTO teachers(id, name, subject, created_at, updated_at) VALUES(?, ?, ?, ?, ?)",
        (&teacher_id, &name, subject.as_deref(), &now, &now),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }

    ok(&req.id, json!({ "teacherId": teacher_id, "name": name }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let teacher_id = match req.params.get("teacherId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing teacherId", None),
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let mut name: Option<String> = None;
    let mut subject: Option<Option<String>> = None;
    for (k, v) in patch {
        match k.as_str() {
            "name" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.name must be a string", None);
                };
                let s = s.trim().to_string();
                if s.is_empty() {
                    return err(&req.id, "bad_params", "name must not be empty", None);
                }
                name = Some(s);
            }
            "subject" => {
                if v.is_null() {
                    subject = Some(None);
                } else if let Some(s) = v.as_str() {
                    let t = s.trim().to_string();
                    subject = Some(if t.is_empty() { None } else { Some(t) });
                } else {
                    return err(
                        &req.id,
                        "bad_params",
                        "patch.subject must be a string or null",
                        None,
                    );
                }
            }
            other => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown patch field: {other}"),
                    None,
                )
            }
        }
    }
    if name.is_none() && subject.is_none() {
        return err(
            &req.id,
            "bad_params",
            "patch must include at least one field",
            None,
        );
    }

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind: Vec<rusqlite::types::Value> = Vec::new();
    if let Some(n) = name {
        set_parts.push("name = ?".into());
        bind.push(rusqlite::types::Value::Text(n));
    }
    if let Some(s) = subject {
        set_parts.push("subject = ?".into());
        bind.push(match s {
            Some(s) => rusqlite::types::Value::Text(s),
            None => rusqlite::types::Value::Null,
        });
    }
    set_parts.push("updated_at = ?".into());
    bind.push(rusqlite::types::Value::Text(db::now_iso()));
    bind.push(rusqlite::types::Value::Text(teacher_id));

    let sql = format!("UPDATE teachers SET {} WHERE id = ?", set_parts.join(", "));
    let changed = match conn.execute(&sql, rusqlite::params_from_iter(bind)) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "teachers" })),
            )
        }
    };
    if changed == 0 {
        return err(&req.id, "not_found", "teacher not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let teacher_id = match req.params.get("teacherId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing teacherId", None),
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

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute(
        "DELETE FROM teacher_availability WHERE teacher_id = ?",
        [&teacher_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "teacher_availability" })),
        );
    }
    if let Err(e) = tx.execute(
        "DELETE FROM schedule_entries WHERE teacher_id = ?",
        [&teacher_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "schedule_entries" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM teachers WHERE id = ?", [&teacher_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_list(state, req)),
        "teachers.create" => Some(handle_create(state, req)),
        "teachers.update" => Some(handle_update(state, req)),
        "teachers.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
