use anyhow::bail;
use rusqlite::Connection;
use std::path::Path;

use crate::conflict::{
    AvailabilitySlot, BlockedSlot, BreakRule, ScheduleEntry, SchoolConstraints, Teacher,
};

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("timetable.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_availability(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            is_available INTEGER NOT NULL,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            UNIQUE(teacher_id, day_of_week)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_availability_teacher ON teacher_availability(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS work_hours_config(
            id TEXT PRIMARY KEY,
            start_time TEXT NOT NULL DEFAULT '08:00',
            end_time TEXT NOT NULL DEFAULT '17:00',
            lunch_break_start TEXT NOT NULL DEFAULT '12:00',
            lunch_break_end TEXT NOT NULL DEFAULT '13:00',
            course_duration_minutes INTEGER NOT NULL DEFAULT 55,
            break_between_courses_minutes INTEGER NOT NULL DEFAULT 10,
            work_days INTEGER NOT NULL DEFAULT 6,
            max_hours_per_day INTEGER NOT NULL DEFAULT 8,
            max_hours_per_week INTEGER NOT NULL DEFAULT 40,
            lunch_break_mandatory INTEGER NOT NULL DEFAULT 1,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS breaks(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS blocked_time_slots(
            id TEXT PRIMARY KEY,
            day_of_week INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            reason TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_entries(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            room_id TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_entries_class ON schedule_entries(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_entries_teacher ON schedule_entries(teacher_id)",
        [],
    )?;

    // Early workspaces created teachers without a subject column.
    ensure_teachers_subject(&conn)?;
    ensure_schedule_entries_room(&conn)?;

    Ok(conn)
}

fn ensure_teachers_subject(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "teachers", "subject")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE teachers ADD COLUMN subject TEXT", [])?;
    Ok(())
}

fn ensure_schedule_entries_room(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "schedule_entries", "room_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE schedule_entries ADD COLUMN room_id TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn load_teachers(conn: &Connection) -> anyhow::Result<Vec<Teacher>> {
    let mut stmt = conn.prepare("SELECT id, name, subject FROM teachers ORDER BY name, id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Teacher {
                id: row.get(0)?,
                name: row.get(1)?,
                subject: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_availability(
    conn: &Connection,
    teacher_id: Option<&str>,
) -> anyhow::Result<Vec<AvailabilitySlot>> {
    let base = "SELECT teacher_id, day_of_week, start_time, end_time, is_available
                FROM teacher_availability";
    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<AvailabilitySlot> {
        let is_available: i64 = row.get(4)?;
        Ok(AvailabilitySlot {
            teacher_id: row.get(0)?,
            day_of_week: row.get::<_, i64>(1)? as u8,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            is_available: is_available != 0,
        })
    };
    let rows = match teacher_id {
        Some(tid) => {
            let sql = format!("{base} WHERE teacher_id = ? ORDER BY day_of_week");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([tid], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("{base} ORDER BY teacher_id, day_of_week");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

/// Replace every availability row for one teacher in a single transaction.
/// The save is all-or-nothing: a failed insert leaves the previous grid
/// intact rather than a teacher with no rows.
pub fn replace_availability(
    conn: &Connection,
    teacher_id: &str,
    slots: &[AvailabilitySlot],
) -> anyhow::Result<()> {
    for s in slots {
        if s.teacher_id != teacher_id {
            bail!("slot teacherId {} does not match {}", s.teacher_id, teacher_id);
        }
    }
    let now = now_iso();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM teacher_availability WHERE teacher_id = ?",
        [teacher_id],
    )?;
    {
        let mut ins = tx.prepare(
            "INSERT INTO teacher_availability(
               id, teacher_id, day_of_week, start_time, end_time, is_available,
               created_at, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for s in slots {
            let id = uuid::Uuid::new_v4().to_string();
            ins.execute((
                &id,
                teacher_id,
                s.day_of_week as i64,
                &s.start_time,
                &s.end_time,
                if s.is_available { 1 } else { 0 },
                &now,
                &now,
            ))?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Load the merged constraint document: singleton config row (created with
/// defaults on first read) plus breaks and blocked slots.
pub fn load_constraints(conn: &Connection) -> anyhow::Result<SchoolConstraints> {
    ensure_config_row(conn)?;
    let (
        max_hours_per_day,
        max_hours_per_week,
        min_rest_minutes,
        lunch_break_mandatory,
        lunch_break_start,
        lunch_break_end,
    ) = conn.query_row(
        "SELECT max_hours_per_day, max_hours_per_week, break_between_courses_minutes,
                lunch_break_mandatory, lunch_break_start, lunch_break_end
         FROM work_hours_config LIMIT 1",
        [],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)? != 0,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, name, start_time, end_time, duration_minutes FROM breaks ORDER BY start_time, id",
    )?;
    let mandatory_breaks = stmt
        .query_map([], |row| {
            Ok(BreakRule {
                id: row.get(0)?,
                name: row.get(1)?,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
                duration_minutes: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, day_of_week, start_time, end_time, reason
         FROM blocked_time_slots ORDER BY day_of_week, start_time, id",
    )?;
    let blocked_time_slots = stmt
        .query_map([], |row| {
            Ok(BlockedSlot {
                id: row.get(0)?,
                day_of_week: row.get::<_, i64>(1)? as u8,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
                reason: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SchoolConstraints {
        max_hours_per_day,
        max_hours_per_week,
        min_rest_minutes,
        lunch_break_mandatory,
        lunch_break_start,
        lunch_break_end,
        mandatory_breaks,
        blocked_time_slots,
    })
}

fn ensure_config_row(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM work_hours_config", [], |r| r.get(0))?;
    if count == 0 {
        let now = now_iso();
        conn.execute(
            "INSERT INTO work_hours_config(id, created_at, updated_at) VALUES(?, ?, ?)",
            (uuid::Uuid::new_v4().to_string(), &now, &now),
        )?;
    }
    Ok(())
}

pub fn load_schedule(
    conn: &Connection,
    class_id: Option<&str>,
) -> anyhow::Result<Vec<ScheduleEntry>> {
    let base = "SELECT id, class_id, subject_id, teacher_id, day_of_week, start_time, end_time, room_id
                FROM schedule_entries";
    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<ScheduleEntry> {
        Ok(ScheduleEntry {
            id: row.get(0)?,
            class_id: row.get(1)?,
            subject_id: row.get(2)?,
            teacher_id: row.get(3)?,
            day_of_week: row.get::<_, i64>(4)? as u8,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
            room_id: row.get(7)?,
        })
    };
    let rows = match class_id {
        Some(cid) => {
            let sql = format!("{base} WHERE class_id = ? ORDER BY day_of_week, start_time, id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([cid], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("{base} ORDER BY class_id, day_of_week, start_time, id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}
