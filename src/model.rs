use chrono::{NaiveDate, NaiveTime};
use rusqlite::Row;
use serde::Serialize;

pub const DATE_FMT: &str = "%Y-%m-%d";
pub const TIME_FMT: &str = "%H:%M:%S";

/// Accepts `HH:MM:SS` and `HH:MM`.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let t = s.trim();
    NaiveTime::parse_from_str(t, TIME_FMT)
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .ok()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FMT).ok()
}

pub fn fmt_time(t: NaiveTime) -> String {
    t.format(TIME_FMT).to_string()
}

pub fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub grade: String,
    pub parent_phone: Option<String>,
    pub created_at: String,
    /// `None` until the first update.
    pub updated_at: Option<String>,
}

impl Student {
    pub const COLUMNS: &'static str = "id, name, grade, parent_phone, created_at, updated_at";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            grade: r.get(2)?,
            parent_phone: r.get(3)?,
            created_at: r.get(4)?,
            updated_at: r.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub student_id: String,
    pub weekday: u32,
    pub expected_time: String,
}

impl Schedule {
    pub const COLUMNS: &'static str = "id, student_id, weekday, expected_time";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            student_id: r.get(1)?,
            weekday: r.get(2)?,
            expected_time: r.get(3)?,
        })
    }

    pub fn expected(&self) -> Option<NaiveTime> {
        parse_time(&self.expected_time)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub status: String,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
}

impl Attendance {
    pub const COLUMNS: &'static str = "id, student_id, date, status, check_in, check_out";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            student_id: r.get(1)?,
            date: r.get(2)?,
            status: r.get(3)?,
            check_in: r.get(4)?,
            check_out: r.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTask {
    pub id: String,
    pub daily_log_id: String,
    pub content: String,
    pub grading_done: bool,
    pub review_done: bool,
}

impl DailyTask {
    pub const COLUMNS: &'static str = "id, daily_log_id, content, grading_done, review_done";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            daily_log_id: r.get(1)?,
            content: r.get(2)?,
            grading_done: r.get::<_, i64>(3)? != 0,
            review_done: r.get::<_, i64>(4)? != 0,
        })
    }

    pub fn is_done(&self) -> bool {
        self.grading_done && self.review_done
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "dailyLogId": self.daily_log_id,
            "content": self.content,
            "gradingDone": self.grading_done,
            "reviewDone": self.review_done,
            "isDone": self.is_done(),
        })
    }
}

/// Free-text follow-up fields carried by a daily log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFields {
    pub teacher_note: Option<String>,
    pub attendance_status: Option<String>,
    pub absence_reason: Option<String>,
    pub follow_up_action: Option<String>,
    pub makeup_class_note: Option<String>,
    pub exam_result: Option<String>,
}

impl LogFields {
    /// Overlay `incoming` onto `self`. Missing and empty values leave the
    /// existing value untouched.
    pub fn merge_non_empty(&mut self, incoming: &LogFields) {
        fn apply(dst: &mut Option<String>, src: &Option<String>) {
            if let Some(v) = src {
                if !v.is_empty() {
                    *dst = Some(v.clone());
                }
            }
        }
        apply(&mut self.teacher_note, &incoming.teacher_note);
        apply(&mut self.attendance_status, &incoming.attendance_status);
        apply(&mut self.absence_reason, &incoming.absence_reason);
        apply(&mut self.follow_up_action, &incoming.follow_up_action);
        apply(&mut self.makeup_class_note, &incoming.makeup_class_note);
        apply(&mut self.exam_result, &incoming.exam_result);
    }
}

/// A daily log loaded together with the tasks it owns.
#[derive(Debug, Clone)]
pub struct DailyLog {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub fields: LogFields,
    pub tasks: Vec<DailyTask>,
}

impl DailyLog {
    pub const COLUMNS: &'static str = "id, student_id, date, teacher_note, attendance_status, \
         absence_reason, follow_up_action, makeup_class_note, exam_result";

    /// Maps a `daily_logs` row; tasks are attached by the caller.
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            student_id: r.get(1)?,
            date: r.get(2)?,
            fields: LogFields {
                teacher_note: r.get(3)?,
                attendance_status: r.get(4)?,
                absence_reason: r.get(5)?,
                follow_up_action: r.get(6)?,
                makeup_class_note: r.get(7)?,
                exam_result: r.get(8)?,
            },
            tasks: Vec::new(),
        })
    }

    /// True when every task is done; a log without tasks counts as complete.
    pub fn is_completed(&self) -> bool {
        self.tasks.iter().all(DailyTask::is_done)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let f = &self.fields;
        serde_json::json!({
            "id": self.id,
            "studentId": self.student_id,
            "date": self.date,
            "teacherNote": f.teacher_note,
            "attendanceStatus": f.attendance_status,
            "absenceReason": f.absence_reason,
            "followUpAction": f.follow_up_action,
            "makeupClassNote": f.makeup_class_note,
            "examResult": f.exam_result,
            "tasks": self.tasks.iter().map(DailyTask::to_json).collect::<Vec<_>>(),
            "isCompleted": self.is_completed(),
        })
    }
}

/// Incoming task contents that are not already on the log, in submission
/// order. Duplicates within `incoming` collapse to their first occurrence.
pub fn new_task_contents<'a, I>(existing: &[DailyTask], incoming: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: std::collections::HashSet<&str> =
        existing.iter().map(|t| t.content.as_str()).collect();
    let mut out = Vec::new();
    for content in incoming {
        if seen.insert(content) {
            out.push(content.to_string());
        }
    }
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: String,
    pub student_id: Option<String>,
    pub student_name: String,
    pub student_grade: Option<String>,
    pub date: String,
    pub time: String,
    pub parent_name: Option<String>,
    pub content: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Consultation {
    pub const COLUMNS: &'static str = "id, student_id, student_name, student_grade, date, time, \
         parent_name, content, notes, status, created_at, updated_at";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            student_id: r.get(1)?,
            student_name: r.get(2)?,
            student_grade: r.get(3)?,
            date: r.get(4)?,
            time: r.get(5)?,
            parent_name: r.get(6)?,
            content: r.get(7)?,
            notes: r.get(8)?,
            status: r.get(9)?,
            created_at: r.get(10)?,
            updated_at: r.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(content: &str, grading_done: bool, review_done: bool) -> DailyTask {
        DailyTask {
            id: content.to_string(),
            daily_log_id: "log".to_string(),
            content: content.to_string(),
            grading_done,
            review_done,
        }
    }

    fn log_with(tasks: Vec<DailyTask>) -> DailyLog {
        DailyLog {
            id: "log".to_string(),
            student_id: "s".to_string(),
            date: "2024-06-12".to_string(),
            fields: LogFields::default(),
            tasks,
        }
    }

    #[test]
    fn task_is_done_needs_grading_and_review() {
        assert!(!task("a", false, false).is_done());
        assert!(!task("a", true, false).is_done());
        assert!(!task("a", false, true).is_done());
        assert!(task("a", true, true).is_done());
    }

    #[test]
    fn empty_log_is_vacuously_completed() {
        assert!(log_with(Vec::new()).is_completed());
    }

    #[test]
    fn log_completion_requires_every_task() {
        let log = log_with(vec![task("a", true, true), task("b", true, false)]);
        assert!(!log.is_completed());
        let log = log_with(vec![task("a", true, true), task("b", true, true)]);
        assert!(log.is_completed());
    }

    #[test]
    fn merge_ignores_missing_and_empty_values() {
        let mut fields = LogFields {
            teacher_note: Some("kept".into()),
            exam_result: Some("90".into()),
            ..Default::default()
        };
        fields.merge_non_empty(&LogFields {
            teacher_note: Some(String::new()),
            exam_result: None,
            absence_reason: Some("sick".into()),
            ..Default::default()
        });
        assert_eq!(fields.teacher_note.as_deref(), Some("kept"));
        assert_eq!(fields.exam_result.as_deref(), Some("90"));
        assert_eq!(fields.absence_reason.as_deref(), Some("sick"));
    }

    #[test]
    fn new_tasks_skip_existing_and_repeated_content() {
        let existing = vec![task("Workbook p.12", false, false)];
        let fresh = new_task_contents(
            &existing,
            ["Workbook p.12", "Vocab quiz", "Vocab quiz", "workbook p.12"],
        );
        assert_eq!(fresh, vec!["Vocab quiz".to_string(), "workbook p.12".to_string()]);
    }

    #[test]
    fn parse_time_accepts_short_form() {
        assert_eq!(parse_time("15:00"), NaiveTime::from_hms_opt(15, 0, 0));
        assert_eq!(parse_time("09:05:30"), NaiveTime::from_hms_opt(9, 5, 30));
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("soon"), None);
    }
}
