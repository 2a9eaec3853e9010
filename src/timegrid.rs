//! Minutes-since-midnight arithmetic for `HH:MM` schedule times.
//!
//! Every persisted time in the workspace db is a zero-padded `HH:MM` string;
//! all interval reasoning happens on parsed minute values. Intervals are
//! half-open `[start, end)`.

/// Parse a strict `HH:MM` string into minutes since midnight.
pub fn parse_hhmm(s: &str) -> Option<u16> {
    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return None;
    }
    let h: u16 = s[0..2].parse().ok()?;
    let m: u16 = s[3..5].parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

pub fn format_hhmm(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Half-open overlap test: `[a_start, a_end)` intersects `[b_start, b_end)`.
pub fn overlaps(a_start: u16, a_end: u16, b_start: u16, b_end: u16) -> bool {
    a_start < b_end && a_end > b_start
}

/// `[inner_start, inner_end)` lies fully inside `[outer_start, outer_end)`.
pub fn contains(outer_start: u16, outer_end: u16, inner_start: u16, inner_end: u16) -> bool {
    inner_start >= outer_start && inner_end <= outer_end
}

/// A parsed, validated availability window or assignment interval on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u16,
    pub end: u16,
}

impl Interval {
    /// Parse a `(start, end)` pair, requiring `start < end`.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        let start = parse_hhmm(start)?;
        let end = parse_hhmm(end)?;
        if start >= end {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hhmm_accepts_padded_times_only() {
        assert_eq!(parse_hhmm("08:00"), Some(480));
        assert_eq!(parse_hhmm("17:30"), Some(1050));
        assert_eq!(parse_hhmm("00:00"), Some(0));
        assert_eq!(parse_hhmm("23:59"), Some(1439));
        assert_eq!(parse_hhmm("8:00"), None);
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("12-30"), None);
        assert_eq!(parse_hhmm(""), None);
    }

    #[test]
    fn format_round_trips() {
        for s in ["00:00", "08:05", "12:30", "23:59"] {
            assert_eq!(format_hhmm(parse_hhmm(s).unwrap()), s);
        }
    }

    #[test]
    fn half_open_overlap_excludes_touching_intervals() {
        // 08:00-10:00 vs 10:00-12:00 share only the boundary.
        assert!(!overlaps(480, 600, 600, 720));
        assert!(overlaps(480, 601, 600, 720));
        assert!(overlaps(480, 720, 540, 600));
    }

    #[test]
    fn containment_is_inclusive_of_equal_bounds() {
        assert!(contains(480, 720, 480, 720));
        assert!(contains(480, 720, 540, 600));
        assert!(!contains(480, 720, 479, 600));
        assert!(!contains(480, 720, 540, 721));
    }

    #[test]
    fn interval_parse_rejects_empty_and_inverted_ranges() {
        assert_eq!(
            Interval::parse("09:00", "11:00"),
            Some(Interval { start: 540, end: 660 })
        );
        assert_eq!(Interval::parse("11:00", "11:00"), None);
        assert_eq!(Interval::parse("11:00", "09:00"), None);
    }
}
