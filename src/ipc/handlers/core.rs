use crate::auth::{SqliteTokenStore, TokenStore};
use crate::config::AcademyConfig;
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{required_str, respond};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::notify::build_notifier;
use crate::report::CommandRenderer;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &AppState) -> serde_json::Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|w| w.path.to_string_lossy().to_string()),
        "now": state.clock.now().format("%Y-%m-%dT%H:%M:%S").to_string(),
    })
}

/// Opens (or creates) the workspace database, loads `academy.toml` and
/// swaps the result into `state`. The previous workspace stays selected if
/// anything fails.
pub fn select_workspace(state: &mut AppState, path: &Path) -> Result<serde_json::Value, HandlerErr> {
    let conn = db::open_db(path).map_err(|e| HandlerErr::WorkspaceOpen(format!("{e:#}")))?;
    let config = AcademyConfig::load(path)?;

    if config.uses_default_operator() {
        tracing::warn!(
            "workspace uses the default operator credentials; configure [[auth.operators]] in academy.toml"
        );
    }
    let purged = SqliteTokenStore::new(&conn).purge_expired(state.clock.now())?;
    if purged > 0 {
        tracing::debug!(purged, "dropped expired sessions");
    }

    let notifier = build_notifier(&config.sms)?;
    let renderer = Box::new(CommandRenderer::new(&config.academy.name, &config.report));
    tracing::info!(
        workspace = %path.display(),
        sms = ?config.sms.backend,
        report_command = config.report.command.as_deref().unwrap_or("-"),
        "workspace selected"
    );

    state.workspace = Some(Workspace {
        path: path.to_path_buf(),
        conn,
        notifier,
        renderer,
        config,
    });
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_str(&req.params, "path")?);
    select_workspace(state, &path)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => Ok(handle_health(state)),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
