use super::handlers;
use super::helpers::respond;
use super::types::{AppState, Request};
use crate::ipc::error::err;

/// Methods callable without a session token.
const PUBLIC_METHODS: &[&str] = &["health", "workspace.select", "auth.login", "auth.logout"];

/// Every method some handler answers. Anything else is rejected before the
/// auth gate so callers learn the method is missing rather than forbidden.
const KNOWN_METHODS: &[&str] = &[
    "health",
    "workspace.select",
    "auth.login",
    "auth.me",
    "auth.logout",
    "students.list",
    "students.create",
    "students.get",
    "students.update",
    "schedules.list",
    "schedules.upsert",
    "schedules.delete",
    "attendance.upsert",
    "attendance.listByStudent",
    "attendance.today",
    "attendance.absentToday",
    "attendance.sendAbsentSms",
    "dailyLogs.create",
    "dailyLogs.get",
    "dailyLogs.listByStudent",
    "dailyLogs.listByDate",
    "dailyLogs.delete",
    "dailyLogs.renderImage",
    "dailyLogs.imageFile",
    "dailyTasks.update",
    "dailyTasks.delete",
    "consultations.create",
    "consultations.list",
    "consultations.listByDate",
    "consultations.get",
    "consultations.update",
    "consultations.delete",
];

fn not_implemented(req: &Request) -> serde_json::Value {
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

fn dispatch(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::auth::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::students::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::schedules::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::attendance::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::daily_logs::try_handle(state, req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::daily_tasks::try_handle(state, req) {
        return Some(resp);
    }
    handlers::consultations::try_handle(state, req)
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");

    if !KNOWN_METHODS.contains(&req.method.as_str()) {
        return not_implemented(&req);
    }

    if !PUBLIC_METHODS.contains(&req.method.as_str()) {
        if let Err(e) = handlers::auth::authorize(state, &req) {
            return respond(&req, Err(e));
        }
    }

    dispatch(state, &req).unwrap_or_else(|| not_implemented(&req))
}
