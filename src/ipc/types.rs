use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::clock::Clock;
use crate::config::AcademyConfig;
use crate::notify::Notifier;
use crate::report::ReportRenderer;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub token: Option<String>,
}

/// Everything that belongs to the selected workspace directory.
pub struct Workspace {
    pub path: PathBuf,
    pub conn: Connection,
    pub config: AcademyConfig,
    pub notifier: Box<dyn Notifier>,
    pub renderer: Box<dyn ReportRenderer>,
}

pub struct AppState {
    pub clock: Box<dyn Clock>,
    pub workspace: Option<Workspace>,
}

impl AppState {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            workspace: None,
        }
    }
}
