use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Serialize;

/// Where a student stands for today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Present,
    LateOrAbsent,
    Unchecked,
}

impl DayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DayStatus::Present => "present",
            DayStatus::LateOrAbsent => "late_or_absent",
            DayStatus::Unchecked => "unchecked",
        }
    }
}

/// The parts of today's attendance row the resolver looks at.
#[derive(Debug, Clone, Copy)]
pub struct AttendanceMark<'a> {
    pub status: &'a str,
    pub check_in: Option<NaiveTime>,
}

pub const ABSENT: &str = "absent";

/// Weekday index used by the schedule table: 0 = Monday .. 6 = Sunday.
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_monday()
}

/// Classifies one student for today.
///
/// `expected` is the arrival time from today's schedule row, `None` when the
/// student is not scheduled today. `attendance` is today's ledger row, `None`
/// when nothing has been recorded yet.
pub fn resolve(
    now: NaiveTime,
    expected: Option<NaiveTime>,
    attendance: Option<AttendanceMark<'_>>,
) -> DayStatus {
    if let Some(mark) = attendance {
        if mark.check_in.is_some() {
            return DayStatus::Present;
        }
        if mark.status == ABSENT {
            return DayStatus::LateOrAbsent;
        }
    }
    match expected {
        Some(t) if now >= t => DayStatus::LateOrAbsent,
        _ => DayStatus::Unchecked,
    }
}

/// A parent is notified exactly when the student resolves to late_or_absent,
/// so the status board and the SMS list always agree.
pub fn needs_notification(status: DayStatus) -> bool {
    status == DayStatus::LateOrAbsent
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub present: usize,
    pub late_or_absent: usize,
    pub unchecked: usize,
}

impl StatusSummary {
    pub fn tally<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = DayStatus>,
    {
        let mut s = Self::default();
        for st in statuses {
            match st {
                DayStatus::Present => s.present += 1,
                DayStatus::LateOrAbsent => s.late_or_absent += 1,
                DayStatus::Unchecked => s.unchecked += 1,
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    fn mark(status: &str, check_in: Option<NaiveTime>) -> AttendanceMark<'_> {
        AttendanceMark { status, check_in }
    }

    #[test]
    fn check_in_wins_over_everything() {
        for now in [t(0, 0), t(14, 59), t(15, 0), t(23, 59)] {
            for expected in [None, Some(t(15, 0)), Some(t(0, 0))] {
                for status in ["present", "absent", "late", ""] {
                    assert_eq!(
                        resolve(now, expected, Some(mark(status, Some(t(14, 30))))),
                        DayStatus::Present
                    );
                }
            }
        }
    }

    #[test]
    fn explicit_absent_without_check_in_is_late_or_absent() {
        assert_eq!(
            resolve(t(9, 0), None, Some(mark("absent", None))),
            DayStatus::LateOrAbsent
        );
        assert_eq!(
            resolve(t(9, 0), Some(t(15, 0)), Some(mark("absent", None))),
            DayStatus::LateOrAbsent
        );
    }

    #[test]
    fn expected_time_boundary_is_inclusive() {
        assert_eq!(resolve(t(14, 59), Some(t(15, 0)), None), DayStatus::Unchecked);
        assert_eq!(resolve(t(15, 0), Some(t(15, 0)), None), DayStatus::LateOrAbsent);
        assert_eq!(resolve(t(15, 1), Some(t(15, 0)), None), DayStatus::LateOrAbsent);
    }

    #[test]
    fn unscheduled_student_stays_unchecked() {
        assert_eq!(resolve(t(23, 59), None, None), DayStatus::Unchecked);
        assert_eq!(
            resolve(t(23, 59), None, Some(mark("present", None))),
            DayStatus::Unchecked
        );
    }

    #[test]
    fn non_absent_record_without_check_in_falls_back_to_schedule() {
        assert_eq!(
            resolve(t(16, 0), Some(t(15, 0)), Some(mark("present", None))),
            DayStatus::LateOrAbsent
        );
        assert_eq!(
            resolve(t(14, 0), Some(t(15, 0)), Some(mark("late", None))),
            DayStatus::Unchecked
        );
    }

    #[test]
    fn wednesday_scenario() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 12).expect("date");
        assert_eq!(weekday_index(date), 2);
        let expected = Some(t(15, 0));
        assert_eq!(resolve(t(14, 59), expected, None), DayStatus::Unchecked);
        assert_eq!(resolve(t(15, 0), expected, None), DayStatus::LateOrAbsent);
        assert_eq!(
            resolve(t(15, 0), expected, Some(mark("present", Some(t(14, 30))))),
            DayStatus::Present
        );
    }

    #[test]
    fn notification_follows_resolved_status() {
        assert!(needs_notification(DayStatus::LateOrAbsent));
        assert!(!needs_notification(DayStatus::Present));
        assert!(!needs_notification(DayStatus::Unchecked));
    }

    #[test]
    fn summary_counts_each_bucket() {
        let s = StatusSummary::tally([
            DayStatus::Present,
            DayStatus::Unchecked,
            DayStatus::LateOrAbsent,
            DayStatus::Present,
        ]);
        assert_eq!(
            s,
            StatusSummary {
                present: 2,
                late_or_absent: 1,
                unchecked: 1
            }
        );
    }
}
