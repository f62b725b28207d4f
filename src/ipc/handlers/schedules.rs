use crate::ipc::error::{commit_failed, tx_failed, update_failed, HandlerErr};
use crate::ipc::helpers::{fetch_student, required_str, required_time, respond, workspace};
use crate::ipc::types::{AppState, Request};
use crate::model::{fmt_time, Schedule};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

fn required_weekday(params: &serde_json::Value) -> Result<u32, HandlerErr> {
    let day = params
        .get("weekday")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerErr::bad_params("missing weekday"))?;
    if day > 6 {
        return Err(HandlerErr::bad_params(
            "weekday must be between 0 (Monday) and 6 (Sunday)",
        ));
    }
    Ok(day as u32)
}

/// Today's schedule rows keyed by student id.
pub(super) fn schedules_for_weekday(
    conn: &Connection,
    weekday: u32,
) -> Result<HashMap<String, Schedule>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM student_schedules WHERE weekday = ?",
        Schedule::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([weekday], Schedule::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|s| (s.student_id.clone(), s))
        .collect())
}

fn schedules_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    fetch_student(conn, &student_id)?;
    let sql = format!(
        "SELECT {} FROM student_schedules WHERE student_id = ? ORDER BY weekday",
        Schedule::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let schedules = stmt
        .query_map([&student_id], Schedule::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "schedules": schedules }))
}

fn schedules_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let weekday = required_weekday(params)?;
    let expected_time = fmt_time(required_time(params, "expectedTime")?);

    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    fetch_student(&tx, &student_id)?;
    tx.execute(
        "INSERT INTO student_schedules(id, student_id, weekday, expected_time)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, weekday) DO UPDATE SET
           expected_time = excluded.expected_time",
        (
            Uuid::new_v4().to_string(),
            &student_id,
            weekday,
            &expected_time,
        ),
    )
    .map_err(update_failed("student_schedules"))?;
    let sql = format!(
        "SELECT {} FROM student_schedules WHERE student_id = ? AND weekday = ?",
        Schedule::COLUMNS
    );
    let schedule = tx.query_row(&sql, (&student_id, weekday), Schedule::from_row)?;
    tx.commit().map_err(commit_failed)?;
    Ok(json!(schedule))
}

fn schedules_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let weekday = required_weekday(params)?;
    let n = conn
        .execute(
            "DELETE FROM student_schedules WHERE student_id = ? AND weekday = ?",
            (&student_id, weekday),
        )
        .map_err(update_failed("student_schedules"))?;
    if n == 0 {
        return Err(HandlerErr::not_found("schedule"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let result = match req.method.as_str() {
        "schedules.list" => workspace(state).and_then(|ws| schedules_list(&ws.conn, params)),
        "schedules.upsert" => workspace(state).and_then(|ws| schedules_upsert(&ws.conn, params)),
        "schedules.delete" => workspace(state).and_then(|ws| schedules_delete(&ws.conn, params)),
        _ => return None,
    };
    Some(respond(req, result))
}
