mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_ok, spawn_sidecar, temp_dir};

type Sidecar<'a> = (&'a mut ChildStdin, &'a mut BufReader<ChildStdout>);

fn create_teacher(side: Sidecar, id: &str, name: &str) -> String {
    let (stdin, reader) = side;
    let created = request_ok(
        stdin,
        reader,
        id,
        "teachers.create",
        json!({ "name": name }),
    );
    created
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string()
}

fn full_week_slots(teacher_id: &str, end: &str) -> serde_json::Value {
    let slots: Vec<_> = (1..=6)
        .map(|d| {
            json!({
                "teacherId": teacher_id,
                "dayOfWeek": d,
                "startTime": "08:00",
                "endTime": end,
                "isAvailable": true
            })
        })
        .collect();
    json!(slots)
}

fn find_conflict<'a>(
    conflicts: &'a [serde_json::Value],
    id: &str,
) -> Option<&'a serde_json::Value> {
    conflicts.iter().find(|c| c["id"] == id)
}

fn weekly_hours(slots: &[serde_json::Value]) -> f64 {
    slots
        .iter()
        .filter(|s| s["isAvailable"] == true)
        .map(|s| {
            let parse = |v: &serde_json::Value| -> f64 {
                let t = v.as_str().unwrap();
                let h: f64 = t[0..2].parse().unwrap();
                let m: f64 = t[3..5].parse().unwrap();
                h + m / 60.0
            };
            parse(&s["endTime"]) - parse(&s["startTime"])
        })
        .sum()
}

#[test]
fn workload_excess_detects_and_resolution_reduces_hours() {
    let workspace = temp_dir("timetabled-excess");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher_id = create_teacher((&mut stdin, &mut reader), "2", "Durand");

    // 6 x 9h = 54h against the default 40h ceiling.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "availability.replace",
        json!({ "teacherId": teacher_id, "slots": full_week_slots(&teacher_id, "17:00") }),
    );

    let detect = request_ok(&mut stdin, &mut reader, "4", "conflicts.detect", json!({}));
    let conflicts = detect["conflicts"].as_array().expect("conflicts");
    let excess_id = format!("workload-{}-excess", teacher_id);
    let excess = find_conflict(conflicts, &excess_id).expect("excess conflict");
    assert_eq!(excess["severity"], "high");
    assert_eq!(excess["autoResolvable"], true);
    assert_eq!(excess["kind"], "workloadExcess");

    // Detection is idempotent on unchanged inputs.
    let detect2 = request_ok(&mut stdin, &mut reader, "5", "conflicts.detect", json!({}));
    let ids: Vec<_> = conflicts.iter().map(|c| c["id"].clone()).collect();
    let ids2: Vec<_> = detect2["conflicts"]
        .as_array()
        .expect("conflicts")
        .iter()
        .map(|c| c["id"].clone())
        .collect();
    assert_eq!(ids, ids2);

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "availability.get",
        json!({ "teacherId": teacher_id }),
    );
    let hours_before = weekly_hours(before["slots"].as_array().expect("slots"));

    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "conflicts.resolve",
        json!({ "conflict": excess }),
    );
    assert_eq!(resolved["success"], true);
    assert_eq!(
        resolved["resolvedConflicts"].as_array().map(|a| a.len()),
        Some(1)
    );

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "availability.get",
        json!({ "teacherId": teacher_id }),
    );
    let slots_after = after["slots"].as_array().expect("slots");
    let hours_after = weekly_hours(slots_after);
    assert!(hours_after < hours_before);
    assert_eq!(hours_before - hours_after, 1.0);
    // One day now ends an hour earlier; no window dropped below 2 hours.
    assert_eq!(
        slots_after
            .iter()
            .filter(|s| s["endTime"] == "16:00")
            .count(),
        1
    );
}

#[test]
fn underuse_resolution_stops_at_end_of_day_cap() {
    let workspace = temp_dir("timetabled-underuse");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "constraints.update",
        json!({ "patch": { "maxHoursPerWeek": 25 } }),
    );
    let teacher_id = create_teacher((&mut stdin, &mut reader), "3", "Martin");

    // Only Monday, 08:00-17:00: 9h is under the 12.5h floor, but the day
    // already ends at the cap.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "availability.replace",
        json!({
            "teacherId": teacher_id,
            "slots": [
                { "teacherId": teacher_id, "dayOfWeek": 1, "startTime": "08:00", "endTime": "17:00", "isAvailable": true }
            ]
        }),
    );

    let detect = request_ok(&mut stdin, &mut reader, "5", "conflicts.detect", json!({}));
    let conflicts = detect["conflicts"].as_array().expect("conflicts");
    let under_id = format!("workload-{}-under", teacher_id);
    let under = find_conflict(conflicts, &under_id).expect("underuse conflict");
    assert_eq!(under["severity"], "low");
    assert_eq!(under["autoResolvable"], true);

    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "conflicts.resolve",
        json!({ "conflict": under }),
    );
    assert_eq!(resolved["success"], false);
    assert_eq!(
        resolved["failedResolutions"].as_array().map(|a| a.len()),
        Some(1)
    );

    // The grid is untouched.
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "availability.get",
        json!({ "teacherId": teacher_id }),
    );
    let slots = after["slots"].as_array().expect("slots");
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0]["endTime"], "17:00");

    // With headroom the same conflict resolves and extends the day.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "availability.replace",
        json!({
            "teacherId": teacher_id,
            "slots": [
                { "teacherId": teacher_id, "dayOfWeek": 1, "startTime": "08:00", "endTime": "15:30", "isAvailable": true }
            ]
        }),
    );
    let detect = request_ok(&mut stdin, &mut reader, "9", "conflicts.detect", json!({}));
    let conflicts = detect["conflicts"].as_array().expect("conflicts");
    let under = find_conflict(conflicts, &under_id).expect("underuse conflict");
    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "conflicts.resolve",
        json!({ "conflict": under }),
    );
    assert_eq!(resolved["success"], true);

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "availability.get",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(after["slots"][0]["endTime"], "16:30");
}

#[test]
fn blocked_slot_and_lunch_conflicts_reference_affected_teachers() {
    let workspace = temp_dir("timetabled-blocked");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher_id = create_teacher((&mut stdin, &mut reader), "2", "Bernard");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "availability.replace",
        json!({
            "teacherId": teacher_id,
            "slots": [
                { "teacherId": teacher_id, "dayOfWeek": 1, "startTime": "08:00", "endTime": "12:00", "isAvailable": true }
            ]
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "constraints.blockedSlots.replace",
        json!({
            "blockedSlots": [
                { "dayOfWeek": 1, "startTime": "10:00", "endTime": "10:15", "reason": "assembly" }
            ]
        }),
    );

    let detect = request_ok(&mut stdin, &mut reader, "5", "conflicts.detect", json!({}));
    let conflicts = detect["conflicts"].as_array().expect("conflicts");

    let blocked = conflicts
        .iter()
        .find(|c| c["kind"] == "blockedSlotCollision")
        .expect("blocked-slot conflict");
    assert_eq!(blocked["severity"], "medium");
    assert_eq!(blocked["autoResolvable"], false);
    assert_eq!(
        blocked["affectedTeachers"].as_array().map(|a| a.len()),
        Some(1)
    );
    assert_eq!(blocked["affectedTeachers"][0], json!(teacher_id));

    // 08:00-12:00 stops before the default 12:00-13:00 lunch: no lunch
    // conflict for this teacher.
    assert!(conflicts.iter().all(|c| c["kind"] != "lunchCollision"));
}

#[test]
fn schedule_conflicts_and_batch_resolution() {
    let workspace = temp_dir("timetabled-schedule-conflicts");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher_id = create_teacher((&mut stdin, &mut reader), "2", "Durand");

    // Declared grid: Monday-only, morning.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "availability.replace",
        json!({
            "teacherId": teacher_id,
            "slots": [
                { "teacherId": teacher_id, "dayOfWeek": 1, "startTime": "08:00", "endTime": "12:00", "isAvailable": true }
            ]
        }),
    );

    // Two classes claim the same teacher at the same start; the second class
    // also schedules outside the declared window.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.replace",
        json!({
            "classId": "6A",
            "entries": [
                { "id": "", "classId": "6A", "subjectId": "math", "teacherId": teacher_id,
                  "dayOfWeek": 1, "startTime": "08:00", "endTime": "09:00" }
            ]
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.replace",
        json!({
            "classId": "6B",
            "entries": [
                { "id": "", "classId": "6B", "subjectId": "math", "teacherId": teacher_id,
                  "dayOfWeek": 1, "startTime": "08:00", "endTime": "09:00" },
                { "id": "", "classId": "6B", "subjectId": "math", "teacherId": teacher_id,
                  "dayOfWeek": 1, "startTime": "13:00", "endTime": "14:00" }
            ]
        }),
    );

    let detect = request_ok(&mut stdin, &mut reader, "6", "conflicts.detect", json!({}));
    let conflicts = detect["conflicts"].as_array().expect("conflicts");

    let double = conflicts
        .iter()
        .find(|c| c["kind"] == "doubleBooking")
        .expect("double-booking conflict");
    assert_eq!(double["severity"], "critical");
    assert_eq!(double["autoResolvable"], false);
    let mut classes: Vec<_> = double["affectedClasses"]
        .as_array()
        .expect("classes")
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    classes.sort();
    assert_eq!(classes, vec!["6A".to_string(), "6B".to_string()]);

    assert!(conflicts
        .iter()
        .any(|c| c["kind"] == "outsideAvailability"));

    // The merged list is ordered most-severe first.
    let ranks: Vec<i32> = conflicts
        .iter()
        .map(|c| match c["severity"].as_str().unwrap() {
            "critical" => 3,
            "high" => 2,
            "medium" => 1,
            _ => 0,
        })
        .collect();
    assert!(ranks.windows(2).all(|w| w[0] >= w[1]));

    // Batch resolution skips everything that is not auto-resolvable and
    // resolves the workload conflicts it can act on.
    let batch = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "conflicts.resolveBatch",
        json!({ "conflicts": conflicts }),
    );
    let resolved_count = batch["resolvedCount"].as_u64().expect("resolvedCount");
    let skipped_count = batch["skippedCount"].as_u64().expect("skippedCount");
    assert!(skipped_count >= 2);
    // Monday-only 4h against the default 40h ceiling is underuse, and the
    // day has headroom, so the batch fixes at least that one.
    assert!(resolved_count >= 1);

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "availability.get",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(after["slots"][0]["endTime"], "13:00");
}
