use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::model::{parse_date, parse_time, Student};

pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            if e.status() >= 500 {
                tracing::warn!(method = %req.method, error = %e, "request failed");
            } else {
                tracing::debug!(method = %req.method, code = e.code(), "request rejected");
            }
            e.response(&req.id)
        }
    }
}

pub fn workspace(state: &AppState) -> Result<&Workspace, HandlerErr> {
    state.workspace.as_ref().ok_or(HandlerErr::NoWorkspace)
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Required string, trimmed, must not be empty.
pub fn required_text(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let s = required_str(params, key)?.trim().to_string();
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

/// Absent and null both read as `None`; anything but a string is rejected.
pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

/// Like [`optional_str`] but trims, and blank reads as `None`.
pub fn optional_text(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    Ok(optional_str(params, key)?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// For partial updates: `None` when the key is absent, `Some(None)` for an
/// explicit null or blank string.
pub fn patch_text(params: &Value, key: &str) -> Result<Option<Option<String>>, HandlerErr> {
    if params.get(key).is_none() {
        return Ok(None);
    }
    Ok(Some(optional_text(params, key)?))
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

pub fn required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = required_str(params, key)?;
    parse_date(&raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match optional_text(params, key)? {
        None => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}

pub fn required_time(params: &Value, key: &str) -> Result<NaiveTime, HandlerErr> {
    let raw = required_str(params, key)?;
    parse_time(&raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be HH:MM or HH:MM:SS", key)))
}

pub fn optional_time(params: &Value, key: &str) -> Result<Option<NaiveTime>, HandlerErr> {
    match optional_text(params, key)? {
        None => Ok(None),
        Some(raw) => parse_time(&raw)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be HH:MM or HH:MM:SS", key))),
    }
}

pub fn find_student(conn: &Connection, student_id: &str) -> Result<Option<Student>, HandlerErr> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", Student::COLUMNS);
    Ok(conn
        .query_row(&sql, [student_id], Student::from_row)
        .optional()?)
}

pub fn fetch_student(conn: &Connection, student_id: &str) -> Result<Student, HandlerErr> {
    find_student(conn, student_id)?.ok_or_else(|| HandlerErr::not_found("student"))
}
