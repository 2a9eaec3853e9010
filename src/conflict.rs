use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::timegrid::{contains, overlaps, Interval};

/// Teaching days are Monday..Saturday, 1-based.
pub const TEACHING_DAYS: u8 = 6;

/// Minimum acceptable daily window before a teacher's day is considered
/// too restrictive to schedule around.
const RESTRICTIVE_WINDOW_MINUTES: u16 = 6 * 60;

/// Flat weekly ceiling applied to assigned (scheduled) hours, independent of
/// the configurable availability ceiling.
const ASSIGNED_HOURS_CEILING: f64 = 30.0;
const ASSIGNED_HOURS_CRITICAL: f64 = 40.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub teacher_id: String,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub is_available: bool,
}

impl AvailabilitySlot {
    pub fn interval(&self) -> Option<Interval> {
        Interval::parse(&self.start_time, &self.end_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakRule {
    pub id: String,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedSlot {
    pub id: String,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub reason: String,
}

/// School-wide constraint configuration, one per workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolConstraints {
    pub max_hours_per_day: i64,
    pub max_hours_per_week: i64,
    pub min_rest_minutes: i64,
    pub lunch_break_mandatory: bool,
    pub lunch_break_start: String,
    pub lunch_break_end: String,
    #[serde(default)]
    pub mandatory_breaks: Vec<BreakRule>,
    #[serde(default)]
    pub blocked_time_slots: Vec<BlockedSlot>,
}

impl SchoolConstraints {
    pub fn lunch_interval(&self) -> Option<Interval> {
        Interval::parse(&self.lunch_break_start, &self.lunch_break_end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub room_id: Option<String>,
}

impl ScheduleEntry {
    pub fn interval(&self) -> Option<Interval> {
        Interval::parse(&self.start_time, &self.end_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn rank(self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }
}

/// One variant per detection rule, carrying the fields its resolution
/// strategy needs. Auto-resolvability is derived from the variant rather
/// than stored alongside it, so the detector and resolver cannot disagree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConflictKind {
    #[serde(rename_all = "camelCase")]
    LimitedAvailability { teacher_id: String, unavailable_days: u8 },
    #[serde(rename_all = "camelCase")]
    RestrictiveWindow {
        teacher_id: String,
        day_of_week: u8,
        window_minutes: u16,
    },
    #[serde(rename_all = "camelCase")]
    WorkloadExcess {
        teacher_id: String,
        weekly_hours: f64,
        max_hours: i64,
    },
    #[serde(rename_all = "camelCase")]
    WorkloadUnderuse {
        teacher_id: String,
        weekly_hours: f64,
        min_hours: f64,
    },
    #[serde(rename_all = "camelCase")]
    BlockedSlotCollision {
        blocked_slot_id: String,
        day_of_week: u8,
    },
    #[serde(rename_all = "camelCase")]
    LunchCollision { teacher_id: String, day_of_week: u8 },
    #[serde(rename_all = "camelCase")]
    DoubleBooking {
        teacher_id: String,
        day_of_week: u8,
        start_time: String,
        entry_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    AssignedOverload {
        teacher_id: String,
        assigned_hours: f64,
    },
    #[serde(rename_all = "camelCase")]
    OutsideAvailability { teacher_id: String, entry_id: String },
    #[serde(rename_all = "camelCase")]
    SubjectClustering {
        class_id: String,
        subject_id: String,
        session_count: usize,
        unique_days: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: String,
    #[serde(flatten)]
    pub kind: ConflictKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub affected_teachers: Vec<String>,
    #[serde(default)]
    pub affected_classes: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Conflict {
    /// Only the workload conflicts have a deterministic remediation the
    /// resolver applies without user input.
    pub fn auto_resolvable(&self) -> bool {
        matches!(
            self.kind,
            ConflictKind::WorkloadExcess { .. } | ConflictKind::WorkloadUnderuse { .. }
        )
    }
}

/// Why a slot is unavailable school-wide, if it is.
pub fn blocked_reason(
    day_of_week: u8,
    slot: Interval,
    constraints: &SchoolConstraints,
) -> Option<String> {
    for b in &constraints.blocked_time_slots {
        if b.day_of_week != day_of_week {
            continue;
        }
        if let Some(iv) = Interval::parse(&b.start_time, &b.end_time) {
            if contains(iv.start, iv.end, slot.start, slot.end) {
                return Some(b.reason.clone());
            }
        }
    }
    // Breaks apply on every teaching day.
    for br in &constraints.mandatory_breaks {
        if let Some(iv) = Interval::parse(&br.start_time, &br.end_time) {
            if contains(iv.start, iv.end, slot.start, slot.end) {
                return Some(br.name.clone());
            }
        }
    }
    if constraints.lunch_break_mandatory {
        if let Some(lunch) = constraints.lunch_interval() {
            if contains(lunch.start, lunch.end, slot.start, slot.end) {
                return Some("lunch break".to_string());
            }
        }
    }
    None
}

/// A slot is blocked only when fully contained in a blocked range; partial
/// overlap is deliberately not flagged here (the scheduling grid shows
/// partially clipped slots rather than rejecting them).
pub fn is_blocked(day_of_week: u8, slot: Interval, constraints: &SchoolConstraints) -> bool {
    blocked_reason(day_of_week, slot, constraints).is_some()
}

/// Per-teacher view of the weekly grid: one available window per day.
struct TeacherWeek<'a> {
    teacher: &'a Teacher,
    // day -> window, only for is_available rows with well-formed times
    windows: HashMap<u8, Interval>,
}

impl TeacherWeek<'_> {
    fn unavailable_days(&self) -> u8 {
        TEACHING_DAYS - self.windows.len() as u8
    }

    fn weekly_hours(&self) -> f64 {
        self.windows
            .values()
            .map(|iv| iv.duration_minutes() as f64 / 60.0)
            .sum()
    }
}

fn build_weeks<'a>(
    teachers: &'a [Teacher],
    availability: &[AvailabilitySlot],
) -> Vec<TeacherWeek<'a>> {
    teachers
        .iter()
        .map(|t| {
            let mut windows = HashMap::new();
            for slot in availability {
                if slot.teacher_id != t.id || !slot.is_available {
                    continue;
                }
                if slot.day_of_week < 1 || slot.day_of_week > TEACHING_DAYS {
                    continue;
                }
                if let Some(iv) = slot.interval() {
                    windows.insert(slot.day_of_week, iv);
                }
            }
            TeacherWeek { teacher: t, windows }
        })
        .collect()
}

pub fn sort_conflicts(conflicts: &mut Vec<Conflict>) {
    // Deterministic: most severe first, then stable id order. Ids are pure
    // functions of the inputs, so an unchanged snapshot re-detects to an
    // identical list.
    conflicts.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Scan teacher availability against the school constraints.
///
/// Pure function of its inputs: the caller supplies an already-loaded
/// snapshot and re-runs detection after every mutation.
pub fn detect_availability_conflicts(
    teachers: &[Teacher],
    availability: &[AvailabilitySlot],
    constraints: &SchoolConstraints,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    let weeks = build_weeks(teachers, availability);
    let lunch = if constraints.lunch_break_mandatory {
        constraints.lunch_interval()
    } else {
        None
    };

    for week in &weeks {
        let t = week.teacher;

        // Rule 1: too few teaching days to schedule around.
        let unavailable = week.unavailable_days();
        if unavailable > 2 {
            let severity = if unavailable > 4 {
                Severity::Critical
            } else {
                Severity::High
            };
            conflicts.push(Conflict {
                id: format!("availability-{}-limited", t.id),
                kind: ConflictKind::LimitedAvailability {
                    teacher_id: t.id.clone(),
                    unavailable_days: unavailable,
                },
                severity,
                title: "Limited availability".to_string(),
                description: format!(
                    "{} is unavailable {} of {} teaching days",
                    t.name, unavailable, TEACHING_DAYS
                ),
                affected_teachers: vec![t.id.clone()],
                affected_classes: Vec::new(),
                suggestions: vec![
                    "Negotiate additional teaching days with the teacher".to_string(),
                    "Redistribute this teacher's subjects across other staff".to_string(),
                ],
            });
        }

        // Rule 2: a day window too narrow to place full course blocks in.
        for day in 1..=TEACHING_DAYS {
            let Some(iv) = week.windows.get(&day) else {
                continue;
            };
            if iv.duration_minutes() < RESTRICTIVE_WINDOW_MINUTES {
                conflicts.push(Conflict {
                    id: format!("window-{}-{}", t.id, day),
                    kind: ConflictKind::RestrictiveWindow {
                        teacher_id: t.id.clone(),
                        day_of_week: day,
                        window_minutes: iv.duration_minutes(),
                    },
                    severity: Severity::Medium,
                    title: "Restrictive daily window".to_string(),
                    description: format!(
                        "{} is available less than 6 hours on day {}",
                        t.name, day
                    ),
                    affected_teachers: vec![t.id.clone()],
                    affected_classes: Vec::new(),
                    suggestions: vec!["Widen the availability window for that day".to_string()],
                });
            }
        }

        // Rules 3/4: weekly hours vs the configured ceiling.
        let weekly = week.weekly_hours();
        let max = constraints.max_hours_per_week;
        if weekly > max as f64 {
            conflicts.push(Conflict {
                id: format!("workload-{}-excess", t.id),
                kind: ConflictKind::WorkloadExcess {
                    teacher_id: t.id.clone(),
                    weekly_hours: weekly,
                    max_hours: max,
                },
                severity: Severity::High,
                title: "Workload above weekly ceiling".to_string(),
                description: format!(
                    "{} declares {:.1}h of availability against a {}h weekly ceiling",
                    t.name, weekly, max
                ),
                affected_teachers: vec![t.id.clone()],
                affected_classes: Vec::new(),
                suggestions: vec!["Reduce the declared availability hours".to_string()],
            });
        } else if weekly < max as f64 * 0.5 {
            conflicts.push(Conflict {
                id: format!("workload-{}-under", t.id),
                kind: ConflictKind::WorkloadUnderuse {
                    teacher_id: t.id.clone(),
                    weekly_hours: weekly,
                    min_hours: max as f64 * 0.5,
                },
                severity: Severity::Low,
                title: "Workload below half the weekly ceiling".to_string(),
                description: format!(
                    "{} declares {:.1}h of availability, under half the {}h ceiling",
                    t.name, weekly, max
                ),
                affected_teachers: vec![t.id.clone()],
                affected_classes: Vec::new(),
                suggestions: vec!["Extend the declared availability hours".to_string()],
            });
        }

        // Rule 6: declared availability overlapping the mandatory lunch break.
        if let Some(lunch) = lunch {
            for day in 1..=TEACHING_DAYS {
                let Some(iv) = week.windows.get(&day) else {
                    continue;
                };
                if overlaps(iv.start, iv.end, lunch.start, lunch.end) {
                    conflicts.push(Conflict {
                        id: format!("lunch-{}-{}", t.id, day),
                        kind: ConflictKind::LunchCollision {
                            teacher_id: t.id.clone(),
                            day_of_week: day,
                        },
                        severity: Severity::Medium,
                        title: "Availability overlaps mandatory lunch break".to_string(),
                        description: format!(
                            "{}'s availability on day {} overlaps the {}-{} lunch break",
                            t.name,
                            day,
                            constraints.lunch_break_start,
                            constraints.lunch_break_end
                        ),
                        affected_teachers: vec![t.id.clone()],
                        affected_classes: Vec::new(),
                        suggestions: vec![
                            "Split the day's availability around the lunch break".to_string(),
                        ],
                    });
                }
            }
        }
    }

    // Rule 5: one conflict per blocked slot, aggregating every teacher whose
    // declared window swallows the blocked range.
    for b in &constraints.blocked_time_slots {
        let Some(biv) = Interval::parse(&b.start_time, &b.end_time) else {
            continue;
        };
        let mut affected: Vec<String> = Vec::new();
        for week in &weeks {
            if let Some(iv) = week.windows.get(&b.day_of_week) {
                if contains(iv.start, iv.end, biv.start, biv.end) {
                    affected.push(week.teacher.id.clone());
                }
            }
        }
        if affected.is_empty() {
            continue;
        }
        conflicts.push(Conflict {
            id: format!("blocked-{}", b.id),
            kind: ConflictKind::BlockedSlotCollision {
                blocked_slot_id: b.id.clone(),
                day_of_week: b.day_of_week,
            },
            severity: Severity::Medium,
            title: "Availability covers a blocked time slot".to_string(),
            description: format!(
                "{} teacher(s) declare availability over the blocked slot {}-{} on day {} ({})",
                affected.len(),
                b.start_time,
                b.end_time,
                b.day_of_week,
                b.reason
            ),
            affected_teachers: affected,
            affected_classes: Vec::new(),
            suggestions: vec![
                "Exclude the blocked range when generating timetables".to_string(),
            ],
        });
    }

    sort_conflicts(&mut conflicts);
    conflicts
}

/// Scan concrete schedule assignments for double booking, assigned-hour
/// overload, assignments outside declared availability, and subject
/// clustering.
pub fn detect_schedule_conflicts(
    teachers: &[Teacher],
    entries: &[ScheduleEntry],
    availability: &[AvailabilitySlot],
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    let names: HashMap<&str, &str> = teachers
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();
    let weeks = build_weeks(teachers, availability);
    let windows_by_teacher: HashMap<&str, &TeacherWeek> = weeks
        .iter()
        .map(|w| (w.teacher.id.as_str(), w))
        .collect();

    let display_name = |id: &str| names.get(id).copied().unwrap_or(id).to_string();

    // Double booking: identical (teacher, day, start) across entries.
    let mut by_slot: HashMap<(String, u8, String), Vec<&ScheduleEntry>> = HashMap::new();
    for e in entries {
        by_slot
            .entry((e.teacher_id.clone(), e.day_of_week, e.start_time.clone()))
            .or_default()
            .push(e);
    }
    for ((teacher_id, day, start), group) in &by_slot {
        if group.len() < 2 {
            continue;
        }
        let mut entry_ids: Vec<String> = group.iter().map(|e| e.id.clone()).collect();
        entry_ids.sort();
        let mut classes: Vec<String> = group.iter().map(|e| e.class_id.clone()).collect();
        classes.sort();
        classes.dedup();
        conflicts.push(Conflict {
            id: format!("doublebook-{}-{}-{}", teacher_id, day, start),
            kind: ConflictKind::DoubleBooking {
                teacher_id: teacher_id.clone(),
                day_of_week: *day,
                start_time: start.clone(),
                entry_ids,
            },
            severity: Severity::Critical,
            title: "Teacher double-booked".to_string(),
            description: format!(
                "{} is assigned to {} classes at {} on day {}",
                display_name(teacher_id),
                group.len(),
                start,
                day
            ),
            affected_teachers: vec![teacher_id.clone()],
            affected_classes: classes,
            suggestions: vec!["Move one of the colliding sessions to a free slot".to_string()],
        });
    }

    // Assigned-hours ceiling, independent of declared availability.
    let mut assigned: HashMap<&str, f64> = HashMap::new();
    for e in entries {
        if let Some(iv) = e.interval() {
            *assigned.entry(e.teacher_id.as_str()).or_default() +=
                iv.duration_minutes() as f64 / 60.0;
        }
    }
    for (teacher_id, hours) in &assigned {
        if *hours <= ASSIGNED_HOURS_CEILING {
            continue;
        }
        let severity = if *hours > ASSIGNED_HOURS_CRITICAL {
            Severity::Critical
        } else {
            Severity::High
        };
        conflicts.push(Conflict {
            id: format!("assigned-{}-overload", teacher_id),
            kind: ConflictKind::AssignedOverload {
                teacher_id: teacher_id.to_string(),
                assigned_hours: *hours,
            },
            severity,
            title: "Assigned hours above weekly ceiling".to_string(),
            description: format!(
                "{} is scheduled for {:.1}h, above the {:.0}h weekly ceiling",
                display_name(teacher_id),
                hours,
                ASSIGNED_HOURS_CEILING
            ),
            affected_teachers: vec![teacher_id.to_string()],
            affected_classes: Vec::new(),
            suggestions: vec!["Reassign part of the load to another teacher".to_string()],
        });
    }

    // Assignment outside the declared availability grid. Teachers without a
    // saved grid are skipped: an empty grid means "not declared yet", not
    // "never available".
    for e in entries {
        let Some(week) = windows_by_teacher.get(e.teacher_id.as_str()) else {
            continue;
        };
        if week.windows.is_empty() {
            continue;
        }
        let Some(iv) = e.interval() else {
            continue;
        };
        let inside = week
            .windows
            .get(&e.day_of_week)
            .map(|w| contains(w.start, w.end, iv.start, iv.end))
            .unwrap_or(false);
        if inside {
            continue;
        }
        conflicts.push(Conflict {
            id: format!("outside-{}", e.id),
            kind: ConflictKind::OutsideAvailability {
                teacher_id: e.teacher_id.clone(),
                entry_id: e.id.clone(),
            },
            severity: Severity::High,
            title: "Assignment outside declared availability".to_string(),
            description: format!(
                "{} is scheduled {}-{} on day {}, outside their declared availability",
                display_name(&e.teacher_id),
                e.start_time,
                e.end_time,
                e.day_of_week
            ),
            affected_teachers: vec![e.teacher_id.clone()],
            affected_classes: vec![e.class_id.clone()],
            suggestions: vec![
                "Move the session inside the teacher's declared window".to_string(),
                "Update the teacher's availability grid".to_string(),
            ],
        });
    }

    // Subject clustering: a subject's sessions concentrated on too few days.
    let mut by_class_subject: HashMap<(String, String), Vec<&ScheduleEntry>> = HashMap::new();
    for e in entries {
        by_class_subject
            .entry((e.class_id.clone(), e.subject_id.clone()))
            .or_default()
            .push(e);
    }
    for ((class_id, subject_id), group) in &by_class_subject {
        let count = group.len();
        let mut days: Vec<u8> = group.iter().map(|e| e.day_of_week).collect();
        days.sort_unstable();
        days.dedup();
        if days.len() * 2 >= count {
            continue;
        }
        conflicts.push(Conflict {
            id: format!("cluster-{}-{}", class_id, subject_id),
            kind: ConflictKind::SubjectClustering {
                class_id: class_id.clone(),
                subject_id: subject_id.clone(),
                session_count: count,
                unique_days: days.len(),
            },
            severity: Severity::Low,
            title: "Subject sessions clustered on few days".to_string(),
            description: format!(
                "{} sessions of subject {} for class {} fall on only {} day(s)",
                count,
                subject_id,
                class_id,
                days.len()
            ),
            affected_teachers: Vec::new(),
            affected_classes: vec![class_id.clone()],
            suggestions: vec!["Spread the subject's sessions across the week".to_string()],
        });
    }

    sort_conflicts(&mut conflicts);
    conflicts
}
