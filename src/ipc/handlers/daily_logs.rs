use crate::ipc::error::{commit_failed, tx_failed, update_failed, HandlerErr};
use crate::ipc::helpers::{
    fetch_student, optional_str, required_date, required_str, respond, workspace,
};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::model::{fmt_date, new_task_contents, DailyLog, DailyTask, LogFields};
use crate::report;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

/// Task contents from `params.tasks`. Entries may be plain strings or
/// `{ "content": ... }` objects.
fn incoming_tasks(params: &Value) -> Result<Vec<String>, HandlerErr> {
    let items = match params.get("tasks") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(HandlerErr::bad_params("tasks must be an array")),
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let raw = match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(_) => item.get("content").and_then(|v| v.as_str()),
            _ => None,
        };
        let content = raw.map(str::trim).unwrap_or("");
        if content.is_empty() {
            return Err(HandlerErr::bad_params(format!(
                "tasks[{}].content must not be empty",
                i
            )));
        }
        out.push(content.to_string());
    }
    Ok(out)
}

fn incoming_fields(params: &Value) -> Result<LogFields, HandlerErr> {
    Ok(LogFields {
        teacher_note: optional_str(params, "teacherNote")?,
        attendance_status: optional_str(params, "attendanceStatus")?,
        absence_reason: optional_str(params, "absenceReason")?,
        follow_up_action: optional_str(params, "followUpAction")?,
        makeup_class_note: optional_str(params, "makeupClassNote")?,
        exam_result: optional_str(params, "examResult")?,
    })
}

fn load_tasks(conn: &Connection, log_id: &str) -> Result<Vec<DailyTask>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM daily_tasks WHERE daily_log_id = ? ORDER BY sort_order, id",
        DailyTask::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map([log_id], DailyTask::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

fn with_tasks(conn: &Connection, mut log: DailyLog) -> Result<DailyLog, HandlerErr> {
    log.tasks = load_tasks(conn, &log.id)?;
    Ok(log)
}

fn find_log(conn: &Connection, log_id: &str) -> Result<Option<DailyLog>, HandlerErr> {
    let sql = format!("SELECT {} FROM daily_logs WHERE id = ?", DailyLog::COLUMNS);
    match conn
        .query_row(&sql, [log_id], DailyLog::from_row)
        .optional()?
    {
        Some(log) => Ok(Some(with_tasks(conn, log)?)),
        None => Ok(None),
    }
}

fn fetch_log(conn: &Connection, log_id: &str) -> Result<DailyLog, HandlerErr> {
    find_log(conn, log_id)?.ok_or_else(|| HandlerErr::not_found("daily log"))
}

fn find_log_for_day(
    conn: &Connection,
    student_id: &str,
    date: &str,
) -> Result<Option<DailyLog>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM daily_logs WHERE student_id = ? AND date = ?",
        DailyLog::COLUMNS
    );
    match conn
        .query_row(&sql, (student_id, date), DailyLog::from_row)
        .optional()?
    {
        Some(log) => Ok(Some(with_tasks(conn, log)?)),
        None => Ok(None),
    }
}

fn query_logs(
    conn: &Connection,
    filter: &str,
    arg: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let sql = format!("SELECT {} FROM daily_logs WHERE {}", DailyLog::COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let logs = stmt
        .query_map([arg], DailyLog::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    logs.into_iter()
        .map(|log| with_tasks(conn, log).map(|l| l.to_json()))
        .collect()
}

fn write_fields(
    conn: &Connection,
    log_id: &str,
    f: &LogFields,
) -> Result<(), HandlerErr> {
    conn.execute(
        "UPDATE daily_logs SET
           teacher_note = ?, attendance_status = ?, absence_reason = ?,
           follow_up_action = ?, makeup_class_note = ?, exam_result = ?
         WHERE id = ?",
        (
            &f.teacher_note,
            &f.attendance_status,
            &f.absence_reason,
            &f.follow_up_action,
            &f.makeup_class_note,
            &f.exam_result,
            log_id,
        ),
    )
    .map_err(update_failed("daily_logs"))?;
    Ok(())
}

/// Creates the log for (student, date), or merges into the one that exists.
fn daily_logs_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let date = fmt_date(required_date(params, "date")?);
    let tasks = incoming_tasks(params)?;
    let incoming = incoming_fields(params)?;

    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    fetch_student(&tx, &student_id)?;

    let (log_id, existing_tasks, merged) = match find_log_for_day(&tx, &student_id, &date)? {
        Some(mut log) => {
            log.fields.merge_non_empty(&incoming);
            write_fields(&tx, &log.id, &log.fields)?;
            (log.id, log.tasks, true)
        }
        None => {
            let mut fields = LogFields::default();
            fields.merge_non_empty(&incoming);
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO daily_logs(id, student_id, date) VALUES(?, ?, ?)",
                (&id, &student_id, &date),
            )
            .map_err(update_failed("daily_logs"))?;
            write_fields(&tx, &id, &fields)?;
            (id, Vec::new(), false)
        }
    };

    let fresh = new_task_contents(&existing_tasks, tasks.iter().map(String::as_str));
    if !fresh.is_empty() {
        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM daily_tasks WHERE daily_log_id = ?",
            [&log_id],
            |r| r.get(0),
        )?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO daily_tasks(id, daily_log_id, content, grading_done, review_done, sort_order)
                 VALUES(?, ?, ?, 0, 0, ?)",
            )
            .map_err(update_failed("daily_tasks"))?;
        for (i, content) in fresh.iter().enumerate() {
            stmt.execute((Uuid::new_v4().to_string(), &log_id, content, next + i as i64))
                .map_err(update_failed("daily_tasks"))?;
        }
    }

    let log = fetch_log(&tx, &log_id)?;
    tx.commit().map_err(commit_failed)?;
    tracing::info!(
        log_id = %log.id,
        merged,
        added_tasks = fresh.len(),
        "daily log saved"
    );
    Ok(log.to_json())
}

fn daily_logs_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let log_id = required_str(params, "logId")?;
    Ok(fetch_log(conn, &log_id)?.to_json())
}

fn daily_logs_list_by_student(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    fetch_student(conn, &student_id)?;
    let logs = query_logs(conn, "student_id = ? ORDER BY date DESC", &student_id)?;
    Ok(json!({ "logs": logs }))
}

fn daily_logs_list_by_date(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let date = fmt_date(required_date(params, "date")?);
    let logs = query_logs(conn, "date = ? ORDER BY (SELECT name FROM students WHERE students.id = daily_logs.student_id)", &date)?;
    Ok(json!({ "date": date, "logs": logs }))
}

fn daily_logs_delete(ws: &Workspace, params: &Value) -> Result<Value, HandlerErr> {
    let log_id = required_str(params, "logId")?;
    let n = ws
        .conn
        .execute("DELETE FROM daily_logs WHERE id = ?", [&log_id])
        .map_err(update_failed("daily_logs"))?;
    if n == 0 {
        return Err(HandlerErr::not_found("daily log"));
    }
    for path in [
        report::image_path(&ws.path, &log_id),
        report::html_path(&ws.path, &log_id),
    ] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "could not remove report file");
            }
        }
    }
    Ok(json!({ "deleted": true }))
}

fn daily_logs_render_image(ws: &Workspace, params: &Value) -> Result<Value, HandlerErr> {
    let log_id = required_str(params, "logId")?;
    let log = fetch_log(&ws.conn, &log_id)?;
    let student = fetch_student(&ws.conn, &log.student_id)?;

    let png = report::image_path(&ws.path, &log.id);
    ws.renderer
        .render(&student, &log, &report::html_path(&ws.path, &log.id), &png)?;
    tracing::info!(log_id = %log.id, path = %png.display(), "report image rendered");
    Ok(json!({
        "imageUrl": report::image_url(&log.id),
        "imagePath": png.to_string_lossy(),
        "shareText": report::share_text(&student.name),
    }))
}

fn daily_logs_image_file(ws: &Workspace, params: &Value) -> Result<Value, HandlerErr> {
    let log_id = required_str(params, "logId")?;
    fetch_log(&ws.conn, &log_id)?;
    let png = report::image_path(&ws.path, &log_id);
    if !png.is_file() {
        return Err(HandlerErr::not_found("image"));
    }
    Ok(json!({
        "path": png.to_string_lossy(),
        "mediaType": "image/png",
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let result = match req.method.as_str() {
        "dailyLogs.create" => workspace(state).and_then(|ws| daily_logs_create(&ws.conn, params)),
        "dailyLogs.get" => workspace(state).and_then(|ws| daily_logs_get(&ws.conn, params)),
        "dailyLogs.listByStudent" => {
            workspace(state).and_then(|ws| daily_logs_list_by_student(&ws.conn, params))
        }
        "dailyLogs.listByDate" => {
            workspace(state).and_then(|ws| daily_logs_list_by_date(&ws.conn, params))
        }
        "dailyLogs.delete" => workspace(state).and_then(|ws| daily_logs_delete(ws, params)),
        "dailyLogs.renderImage" => {
            workspace(state).and_then(|ws| daily_logs_render_image(ws, params))
        }
        "dailyLogs.imageFile" => workspace(state).and_then(|ws| daily_logs_image_file(ws, params)),
        _ => return None,
    };
    Some(respond(req, result))
}
