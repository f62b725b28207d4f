use crate::ipc::error::{commit_failed, tx_failed, update_failed, HandlerErr};
use crate::ipc::helpers::{
    fetch_student, optional_time, required_date, required_str, required_text, respond, workspace,
};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::model::{fmt_date, fmt_time, now_stamp, parse_time, Attendance, Schedule, Student};
use crate::notify::render_message;
use crate::status::{self, AttendanceMark, DayStatus, StatusSummary};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::schedules::schedules_for_weekday;

/// One student's line on today's board.
struct BoardRow {
    student: Student,
    schedule: Option<Schedule>,
    attendance: Option<Attendance>,
    status: DayStatus,
}

impl BoardRow {
    fn expected_time(&self) -> Option<&str> {
        self.schedule.as_ref().map(|s| s.expected_time.as_str())
    }
}

fn attendance_for_date(
    conn: &Connection,
    date: &str,
) -> Result<HashMap<String, Attendance>, HandlerErr> {
    let sql = format!("SELECT {} FROM attendance WHERE date = ?", Attendance::COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([date], Attendance::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|a| (a.student_id.clone(), a))
        .collect())
}

fn all_students(conn: &Connection) -> Result<Vec<Student>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM students ORDER BY name, created_at",
        Student::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], Student::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Resolves every student against today's schedule and ledger.
fn today_board(conn: &Connection, now: NaiveDateTime) -> Result<Vec<BoardRow>, HandlerErr> {
    let date = fmt_date(now.date());
    let mut schedules = schedules_for_weekday(conn, status::weekday_index(now.date()))?;
    let mut ledger = attendance_for_date(conn, &date)?;

    let rows = all_students(conn)?
        .into_iter()
        .map(|student| {
            let schedule = schedules.remove(&student.id);
            let attendance = ledger.remove(&student.id);
            let mark = attendance.as_ref().map(|a| AttendanceMark {
                status: a.status.as_str(),
                check_in: a.check_in.as_deref().and_then(parse_time),
            });
            let status = status::resolve(
                now.time(),
                schedule.as_ref().and_then(Schedule::expected),
                mark,
            );
            BoardRow {
                student,
                schedule,
                attendance,
                status,
            }
        })
        .collect();
    Ok(rows)
}

fn attendance_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let date = fmt_date(required_date(params, "date")?);
    let status = required_text(params, "status")?;
    let check_in = optional_time(params, "checkIn")?.map(fmt_time);
    let check_out = optional_time(params, "checkOut")?.map(fmt_time);

    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    fetch_student(&tx, &student_id)?;
    tx.execute(
        "INSERT INTO attendance(id, student_id, date, status, check_in, check_out, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET
           status = excluded.status,
           check_in = excluded.check_in,
           check_out = excluded.check_out",
        (
            Uuid::new_v4().to_string(),
            &student_id,
            &date,
            &status,
            &check_in,
            &check_out,
            now_stamp(),
        ),
    )
    .map_err(update_failed("attendance"))?;
    let sql = format!(
        "SELECT {} FROM attendance WHERE student_id = ? AND date = ?",
        Attendance::COLUMNS
    );
    let record = tx.query_row(&sql, (&student_id, &date), Attendance::from_row)?;
    tx.commit().map_err(commit_failed)?;
    Ok(json!(record))
}

fn attendance_list_by_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    fetch_student(conn, &student_id)?;
    let sql = format!(
        "SELECT {} FROM attendance WHERE student_id = ? ORDER BY date DESC",
        Attendance::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([&student_id], Attendance::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "attendance": records }))
}

fn attendance_today(conn: &Connection, now: NaiveDateTime) -> Result<serde_json::Value, HandlerErr> {
    let board = today_board(conn, now)?;
    let summary = StatusSummary::tally(board.iter().map(|r| r.status));
    let students: Vec<serde_json::Value> = board
        .iter()
        .map(|r| {
            json!({
                "studentId": r.student.id,
                "name": r.student.name,
                "grade": r.student.grade,
                "expectedTime": r.expected_time(),
                "checkIn": r.attendance.as_ref().and_then(|a| a.check_in.clone()),
                "checkOut": r.attendance.as_ref().and_then(|a| a.check_out.clone()),
                "attendanceStatus": r.attendance.as_ref().map(|a| a.status.clone()),
                "status": r.status.as_str(),
            })
        })
        .collect();
    Ok(json!({
        "date": fmt_date(now.date()),
        "now": fmt_time(now.time()),
        "weekday": status::weekday_index(now.date()),
        "summary": summary,
        "students": students,
    }))
}

fn absent_rows(conn: &Connection, now: NaiveDateTime) -> Result<Vec<BoardRow>, HandlerErr> {
    Ok(today_board(conn, now)?
        .into_iter()
        .filter(|r| status::needs_notification(r.status))
        .collect())
}

fn absent_json(r: &BoardRow) -> serde_json::Value {
    json!({
        "studentId": r.student.id,
        "name": r.student.name,
        "grade": r.student.grade,
        "parentPhone": r.student.parent_phone,
        "expectedTime": r.expected_time(),
        "attendanceStatus": r.attendance.as_ref().map(|a| a.status.clone()),
    })
}

fn attendance_absent_today(
    conn: &Connection,
    now: NaiveDateTime,
) -> Result<serde_json::Value, HandlerErr> {
    let students: Vec<serde_json::Value> = absent_rows(conn, now)?.iter().map(absent_json).collect();
    Ok(json!({
        "date": fmt_date(now.date()),
        "students": students,
    }))
}

/// Texts the parents of everyone on today's absent list. Delivery failures
/// are reported per student and never fail the request.
fn attendance_send_absent_sms(
    ws: &Workspace,
    now: NaiveDateTime,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let only: Option<HashSet<String>> = match params.get("studentIds") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => {
            let ids = v
                .as_array()
                .ok_or_else(|| HandlerErr::bad_params("studentIds must be an array"))?;
            Some(
                ids.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect(),
            )
        }
    };

    let rows = absent_rows(&ws.conn, now)?;
    let mut results = Vec::new();
    let (mut sent, mut failed, mut skipped) = (0usize, 0usize, 0usize);
    for r in rows
        .iter()
        .filter(|r| only.as_ref().map_or(true, |ids| ids.contains(&r.student.id)))
    {
        let phone = r
            .student
            .parent_phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let Some(phone) = phone else {
            skipped += 1;
            tracing::info!(student_id = %r.student.id, "no parent phone, sms skipped");
            results.push(json!({
                "studentId": r.student.id,
                "name": r.student.name,
                "outcome": "skipped",
                "reason": "no parent phone",
            }));
            continue;
        };

        let message = render_message(
            &ws.config.sms.template,
            &r.student.name,
            r.expected_time().unwrap_or("-"),
            &ws.config.academy.name,
        );
        match ws.notifier.send(phone, &message) {
            Ok(message_id) => {
                sent += 1;
                tracing::info!(student_id = %r.student.id, %message_id, "absence sms sent");
                results.push(json!({
                    "studentId": r.student.id,
                    "name": r.student.name,
                    "phone": phone,
                    "outcome": "sent",
                    "messageId": message_id,
                }));
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(student_id = %r.student.id, error = %e, "absence sms failed");
                results.push(json!({
                    "studentId": r.student.id,
                    "name": r.student.name,
                    "phone": phone,
                    "outcome": "failed",
                    "reason": e.to_string(),
                }));
            }
        }
    }

    Ok(json!({
        "date": fmt_date(now.date()),
        "sent": sent,
        "failed": failed,
        "skipped": skipped,
        "results": results,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let now = state.clock.now();
    let result = match req.method.as_str() {
        "attendance.upsert" => workspace(state).and_then(|ws| attendance_upsert(&ws.conn, params)),
        "attendance.listByStudent" => {
            workspace(state).and_then(|ws| attendance_list_by_student(&ws.conn, params))
        }
        "attendance.today" => workspace(state).and_then(|ws| attendance_today(&ws.conn, now)),
        "attendance.absentToday" => {
            workspace(state).and_then(|ws| attendance_absent_today(&ws.conn, now))
        }
        "attendance.sendAbsentSms" => {
            workspace(state).and_then(|ws| attendance_send_absent_sms(ws, now, params))
        }
        _ => return None,
    };
    Some(respond(req, result))
}
