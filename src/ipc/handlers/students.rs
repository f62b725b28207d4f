use crate::ipc::error::{commit_failed, tx_failed, update_failed, HandlerErr};
use crate::ipc::helpers::{
    fetch_student, optional_text, patch_text, required_str, required_text, respond, workspace,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_stamp, Student};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn students_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM students ORDER BY name, created_at",
        Student::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map([], Student::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "students": students }))
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_text(params, "name")?;
    let grade = required_text(params, "grade")?;
    let parent_phone = optional_text(params, "parentPhone")?;

    let student = Student {
        id: Uuid::new_v4().to_string(),
        name,
        grade,
        parent_phone,
        created_at: now_stamp(),
        updated_at: None,
    };
    conn.execute(
        "INSERT INTO students(id, name, grade, parent_phone, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &student.id,
            &student.name,
            &student.grade,
            &student.parent_phone,
            &student.created_at,
        ),
    )
    .map_err(update_failed("students"))?;
    tracing::info!(student_id = %student.id, "student registered");
    Ok(json!(student))
}

fn students_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    Ok(json!(fetch_student(conn, &student_id)?))
}

/// Only keys present in `params` change. `parentPhone: null` clears the phone;
/// name and grade cannot be blanked.
fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let name = patch_text(params, "name")?;
    let grade = patch_text(params, "grade")?;
    let parent_phone = patch_text(params, "parentPhone")?;
    if matches!(name, Some(None)) || matches!(grade, Some(None)) {
        return Err(HandlerErr::bad_params("name/grade must not be empty"));
    }

    let tx = conn.unchecked_transaction().map_err(tx_failed)?;
    let mut student = fetch_student(&tx, &student_id)?;
    if let Some(Some(v)) = name {
        student.name = v;
    }
    if let Some(Some(v)) = grade {
        student.grade = v;
    }
    if let Some(v) = parent_phone {
        student.parent_phone = v;
    }
    student.updated_at = Some(now_stamp());
    tx.execute(
        "UPDATE students SET name = ?, grade = ?, parent_phone = ?, updated_at = ? WHERE id = ?",
        (
            &student.name,
            &student.grade,
            &student.parent_phone,
            &student.updated_at,
            &student.id,
        ),
    )
    .map_err(update_failed("students"))?;
    tx.commit().map_err(commit_failed)?;
    Ok(json!(student))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let result = match req.method.as_str() {
        "students.list" => workspace(state).and_then(|ws| students_list(&ws.conn)),
        "students.create" => workspace(state).and_then(|ws| students_create(&ws.conn, params)),
        "students.get" => workspace(state).and_then(|ws| students_get(&ws.conn, params)),
        "students.update" => workspace(state).and_then(|ws| students_update(&ws.conn, params)),
        _ => return None,
    };
    Some(respond(req, result))
}
