use chrono::Duration;
use serde_json::json;

use crate::auth::{
    AuthError, ConfiguredOperators, CredentialVerifier, Session, SqliteTokenStore, TokenStore,
};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{required_str, respond, workspace};
use crate::ipc::types::{AppState, Request};

const STAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// Token from the request envelope, falling back to `params.token`.
fn request_token(req: &Request) -> Option<String> {
    req.token
        .clone()
        .or_else(|| {
            req.params
                .get("token")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
        .filter(|t| !t.trim().is_empty())
}

/// Validates the session token carried by `req`.
pub fn authorize(state: &AppState, req: &Request) -> Result<Session, HandlerErr> {
    let ws = workspace(state)?;
    let token = request_token(req).ok_or(AuthError::MissingToken)?;
    let session = SqliteTokenStore::new(&ws.conn).validate(&token, state.clock.now())?;
    Ok(session)
}

fn auth_login(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ws = workspace(state)?;
    let username = required_str(&req.params, "username")?;
    let password = required_str(&req.params, "password")?;

    let verifier = ConfiguredOperators::new(&ws.config.auth.operators);
    let Some(operator) = verifier.verify(username.trim(), &password) else {
        tracing::info!(%username, "login rejected");
        return Err(AuthError::BadCredentials.into());
    };

    let ttl = Duration::try_days(ws.config.auth.session_ttl_days).ok_or(AuthError::TtlOutOfRange)?;
    let session = SqliteTokenStore::new(&ws.conn).issue(&operator, state.clock.now(), ttl)?;
    tracing::info!(username = %session.username, "login");
    Ok(json!({
        "token": session.token,
        "teacherName": session.display_name,
        "username": session.username,
        "expiresAt": session.expires_at.format(STAMP_FMT).to_string(),
    }))
}

fn auth_me(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = authorize(state, req)?;
    Ok(json!({
        "teacherName": session.display_name,
        "username": session.username,
        "issuedAt": session.issued_at.format(STAMP_FMT).to_string(),
        "expiresAt": session.expires_at.format(STAMP_FMT).to_string(),
    }))
}

fn auth_logout(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ws = workspace(state)?;
    let revoked = match request_token(req) {
        Some(token) => SqliteTokenStore::new(&ws.conn).revoke(&token)?,
        None => false,
    };
    Ok(json!({ "loggedOut": true, "revoked": revoked }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.login" => auth_login(state, req),
        "auth.me" => auth_me(state, req),
        "auth.logout" => auth_logout(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
