use crate::ipc::error::{commit_failed, tx_failed, update_failed, HandlerErr};
use crate::ipc::helpers::{
    fetch_student, optional_date, optional_text, optional_time, required_date, required_str,
    required_time, respond, workspace,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{fmt_date, fmt_time, now_stamp, Consultation};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const DEFAULT_STATUS: &str = "scheduled";

fn fetch_consultation(conn: &Connection, id: &str) -> Result<Consultation, HandlerErr> {
    let sql = format!("SELECT {} FROM consultations WHERE id = ?", Consultation::COLUMNS);
    conn.query_row(&sql, [id], Consultation::from_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("consultation"))
}

fn consultations_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = optional_text(params, "studentId")?;
    let student_name = optional_text(params, "studentName")?;
    let student_grade = optional_text(params, "studentGrade")?;
    let date = fmt_date(required_date(params, "date")?);
    let time = fmt_time(required_time(params, "time")?);
    let status = optional_text(params, "status")?.unwrap_or_else(|| DEFAULT_STATUS.to_string());
    if student_id.is_none() && student_name.is_none() {
        return Err(HandlerErr::bad_params(
            "studentName is required when studentId is not given",
        ));
    }

    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    // Name and grade are a snapshot taken at write time.
    let (student_name, student_grade) = match &student_id {
        Some(id) => {
            let student = fetch_student(&tx, id)?;
            (
                student_name.unwrap_or(student.name),
                student_grade.or(Some(student.grade)),
            )
        }
        None => (student_name.unwrap_or_default(), student_grade),
    };

    let stamp = now_stamp();
    let record = Consultation {
        id: Uuid::new_v4().to_string(),
        student_id,
        student_name,
        student_grade,
        date,
        time,
        parent_name: optional_text(params, "parentName")?,
        content: optional_text(params, "content")?,
        notes: optional_text(params, "notes")?,
        status,
        created_at: stamp.clone(),
        updated_at: stamp,
    };
    tx.execute(
        "INSERT INTO consultations(id, student_id, student_name, student_grade, date, time,
           parent_name, content, notes, status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &record.id,
            &record.student_id,
            &record.student_name,
            &record.student_grade,
            &record.date,
            &record.time,
            &record.parent_name,
            &record.content,
            &record.notes,
            &record.status,
            &record.created_at,
            &record.updated_at,
        ),
    )
    .map_err(update_failed("consultations"))?;
    tx.commit().map_err(commit_failed)?;
    tracing::info!(consultation_id = %record.id, date = %record.date, "consultation booked");
    Ok(json!(record))
}

/// Inclusive on both ends; either bound may be omitted.
fn consultations_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let start = optional_date(params, "startDate")?.map(fmt_date);
    let end = optional_date(params, "endDate")?.map(fmt_date);

    let mut clauses = Vec::new();
    let mut args = Vec::new();
    if let Some(s) = start {
        clauses.push("date >= ?");
        args.push(s);
    }
    if let Some(e) = end {
        clauses.push("date <= ?");
        args.push(e);
    }
    let filter = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM consultations{} ORDER BY date, time",
        Consultation::COLUMNS,
        filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), Consultation::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "consultations": rows }))
}

fn consultations_list_by_date(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = fmt_date(required_date(params, "date")?);
    let sql = format!(
        "SELECT {} FROM consultations WHERE date = ? ORDER BY time",
        Consultation::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([&date], Consultation::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "date": date, "consultations": rows }))
}

fn consultations_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = required_str(params, "consultationId")?;
    Ok(json!(fetch_consultation(conn, &id)?))
}

/// Absent or null keys leave the stored value alone.
fn consultations_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = required_str(params, "consultationId")?;
    let student_id = optional_text(params, "studentId")?;
    let student_name = optional_text(params, "studentName")?;
    let student_grade = optional_text(params, "studentGrade")?;
    let date = optional_date(params, "date")?.map(fmt_date);
    let time = optional_time(params, "time")?.map(fmt_time);
    let parent_name = optional_text(params, "parentName")?;
    let content = optional_text(params, "content")?;
    let notes = optional_text(params, "notes")?;
    if let Some(serde_json::Value::String(s)) = params.get("status") {
        if s.trim().is_empty() {
            return Err(HandlerErr::bad_params("status must not be empty"));
        }
    }
    let status = optional_text(params, "status")?;

    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    let mut record = fetch_consultation(&tx, &id)?;
    if let Some(sid) = student_id {
        let student = fetch_student(&tx, &sid)?;
        if student_name.is_none() {
            record.student_name = student.name;
        }
        if student_grade.is_none() {
            record.student_grade = Some(student.grade);
        }
        record.student_id = Some(sid);
    }
    if let Some(v) = student_name {
        record.student_name = v;
    }
    if let Some(v) = student_grade {
        record.student_grade = Some(v);
    }
    if let Some(v) = date {
        record.date = v;
    }
    if let Some(v) = time {
        record.time = v;
    }
    if let Some(v) = parent_name {
        record.parent_name = Some(v);
    }
    if let Some(v) = content {
        record.content = Some(v);
    }
    if let Some(v) = notes {
        record.notes = Some(v);
    }
    if let Some(v) = status {
        record.status = v;
    }
    record.updated_at = now_stamp();

    tx.execute(
        "UPDATE consultations SET student_id = ?, student_name = ?, student_grade = ?,
           date = ?, time = ?, parent_name = ?, content = ?, notes = ?, status = ?,
           updated_at = ?
         WHERE id = ?",
        (
            &record.student_id,
            &record.student_name,
            &record.student_grade,
            &record.date,
            &record.time,
            &record.parent_name,
            &record.content,
            &record.notes,
            &record.status,
            &record.updated_at,
            &record.id,
        ),
    )
    .map_err(update_failed("consultations"))?;
    tx.commit().map_err(commit_failed)?;
    Ok(json!(record))
}

fn consultations_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = required_str(params, "consultationId")?;
    let n = conn
        .execute("DELETE FROM consultations WHERE id = ?", [&id])
        .map_err(update_failed("consultations"))?;
    if n == 0 {
        return Err(HandlerErr::not_found("consultation"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let result = match req.method.as_str() {
        "consultations.create" => {
            workspace(state).and_then(|ws| consultations_create(&ws.conn, params))
        }
        "consultations.list" => workspace(state).and_then(|ws| consultations_list(&ws.conn, params)),
        "consultations.listByDate" => {
            workspace(state).and_then(|ws| consultations_list_by_date(&ws.conn, params))
        }
        "consultations.get" => workspace(state).and_then(|ws| consultations_get(&ws.conn, params)),
        "consultations.update" => {
            workspace(state).and_then(|ws| consultations_update(&ws.conn, params))
        }
        "consultations.delete" => {
            workspace(state).and_then(|ws| consultations_delete(&ws.conn, params))
        }
        _ => return None,
    };
    Some(respond(req, result))
}
