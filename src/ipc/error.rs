use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::notify::NotifyError;
use crate::report::RenderError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

/// HTTP-equivalent status for an error code, for front-ends that relay
/// responses over HTTP.
pub fn status_for(code: &str) -> u16 {
    match code {
        "bad_params" | "bad_json" | "config_invalid" => 400,
        "unauthorized" | "session_expired" => 401,
        "not_found" | "not_implemented" => 404,
        "no_workspace" => 409,
        "renderer_unavailable" => 503,
        _ => 500,
    }
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
        "status": status_for(code),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug, Error)]
pub enum HandlerErr {
    #[error("{0}")]
    BadParams(String),
    #[error("{0}")]
    NotFound(String),
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("failed to open workspace: {0}")]
    WorkspaceOpen(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{source}")]
    Db {
        code: &'static str,
        table: Option<&'static str>,
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to set up sms backend: {0}")]
    Notifier(#[from] NotifyError),
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(source: rusqlite::Error) -> Self {
        HandlerErr::Db {
            code: "db_query_failed",
            table: None,
            source,
        }
    }
}

/// Maps a failed write on `table` to `db_update_failed`.
pub fn update_failed(table: &'static str) -> impl FnOnce(rusqlite::Error) -> HandlerErr {
    move |source| HandlerErr::Db {
        code: "db_update_failed",
        table: Some(table),
        source,
    }
}

pub fn tx_failed(source: rusqlite::Error) -> HandlerErr {
    HandlerErr::Db {
        code: "db_tx_failed",
        table: None,
        source,
    }
}

pub fn commit_failed(source: rusqlite::Error) -> HandlerErr {
    HandlerErr::Db {
        code: "db_commit_failed",
        table: None,
        source,
    }
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr::BadParams(message.into())
    }

    pub fn not_found(what: &str) -> Self {
        HandlerErr::NotFound(format!("{} not found", what))
    }

    pub fn code(&self) -> &'static str {
        match self {
            HandlerErr::BadParams(_) => "bad_params",
            HandlerErr::NotFound(_) => "not_found",
            HandlerErr::NoWorkspace => "no_workspace",
            HandlerErr::WorkspaceOpen(_) => "db_open_failed",
            HandlerErr::Config(_) => "config_invalid",
            HandlerErr::Auth(AuthError::Expired) => "session_expired",
            HandlerErr::Auth(AuthError::Store(_)) => "db_query_failed",
            HandlerErr::Auth(AuthError::TtlOutOfRange) => "config_invalid",
            HandlerErr::Auth(_) => "unauthorized",
            HandlerErr::Db { code, .. } => *code,
            HandlerErr::Render(RenderError::Unavailable) => "renderer_unavailable",
            HandlerErr::Render(_) => "render_failed",
            HandlerErr::Notifier(_) => "notifier_init_failed",
        }
    }

    pub fn status(&self) -> u16 {
        status_for(self.code())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        let details = match &self {
            HandlerErr::Db {
                table: Some(table), ..
            } => Some(json!({ "table": table })),
            _ => None,
        };
        err(id, self.code(), self.to_string(), details)
    }
}
