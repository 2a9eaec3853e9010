//! Automatic remediation planning for workload conflicts.
//!
//! Planning is pure: it takes a conflict plus the teacher's current
//! availability rows and returns the replacement rows, or the reason no
//! change is possible. Persistence happens in the IPC handler, inside one
//! transaction per teacher.

use crate::conflict::{AvailabilitySlot, Conflict, ConflictKind};
use crate::timegrid::{format_hhmm, Interval};

/// Shrinking an over-committed day never leaves less than this window.
const MIN_WINDOW_MINUTES: u16 = 2 * 60;

/// Extending an under-used day never pushes the end past 17:00.
const EXTENSION_CAP_MINUTES: u16 = 17 * 60;

/// The largest single adjustment applied per resolution pass.
const ADJUSTMENT_STEP_MINUTES: u16 = 60;

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionPlan {
    /// Replace the teacher's availability rows with the adjusted set.
    ReplaceAvailability {
        teacher_id: String,
        slots: Vec<AvailabilitySlot>,
        message: String,
    },
    /// The conflict is auto-resolvable in principle but no adjustment is
    /// possible (already at the floor/cap).
    NoChange { teacher_id: String, message: String },
    /// Everything except workload conflicts requires human judgement.
    Manual,
}

/// Index of the available slot whose window ends latest; rows with
/// malformed times or `is_available = false` are never adjusted.
fn latest_ending(slots: &[AvailabilitySlot]) -> Option<(usize, Interval)> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_available)
        .filter_map(|(i, s)| s.interval().map(|iv| (i, iv)))
        .max_by_key(|(_, iv)| iv.end)
}

fn earliest_ending(slots: &[AvailabilitySlot]) -> Option<(usize, Interval)> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_available)
        .filter_map(|(i, s)| s.interval().map(|iv| (i, iv)))
        .min_by_key(|(_, iv)| iv.end)
}

pub fn plan_resolution(conflict: &Conflict, slots: &[AvailabilitySlot]) -> ResolutionPlan {
    match &conflict.kind {
        ConflictKind::WorkloadExcess { teacher_id, .. } => plan_shrink(teacher_id, slots),
        ConflictKind::WorkloadUnderuse { teacher_id, .. } => plan_extend(teacher_id, slots),
        _ => ResolutionPlan::Manual,
    }
}

fn plan_shrink(teacher_id: &str, slots: &[AvailabilitySlot]) -> ResolutionPlan {
    let Some((idx, iv)) = latest_ending(slots) else {
        return ResolutionPlan::NoChange {
            teacher_id: teacher_id.to_string(),
            message: "no available day to shrink".to_string(),
        };
    };

    let floor = iv.start + MIN_WINDOW_MINUTES;
    let new_end = iv.end.saturating_sub(ADJUSTMENT_STEP_MINUTES).max(floor);
    if new_end >= iv.end {
        return ResolutionPlan::NoChange {
            teacher_id: teacher_id.to_string(),
            message: "latest day is already at the minimum 2-hour window".to_string(),
        };
    }

    let mut adjusted = slots.to_vec();
    adjusted[idx].end_time = format_hhmm(new_end);
    ResolutionPlan::ReplaceAvailability {
        teacher_id: teacher_id.to_string(),
        slots: adjusted,
        message: format!(
            "reduced day {} to end at {}",
            slots[idx].day_of_week,
            format_hhmm(new_end)
        ),
    }
}

fn plan_extend(teacher_id: &str, slots: &[AvailabilitySlot]) -> ResolutionPlan {
    let Some((idx, iv)) = earliest_ending(slots) else {
        return ResolutionPlan::NoChange {
            teacher_id: teacher_id.to_string(),
            message: "no available day to extend".to_string(),
        };
    };

    let new_end = (iv.end + ADJUSTMENT_STEP_MINUTES).min(EXTENSION_CAP_MINUTES);
    if new_end <= iv.end {
        return ResolutionPlan::NoChange {
            teacher_id: teacher_id.to_string(),
            message: "every available day already ends at or after 17:00".to_string(),
        };
    }

    let mut adjusted = slots.to_vec();
    adjusted[idx].end_time = format_hhmm(new_end);
    ResolutionPlan::ReplaceAvailability {
        teacher_id: teacher_id.to_string(),
        slots: adjusted,
        message: format!(
            "extended day {} to end at {}",
            slots[idx].day_of_week,
            format_hhmm(new_end)
        ),
    }
}
