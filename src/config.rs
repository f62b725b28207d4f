//! Workspace configuration (`academy.toml`).
//!
//! Every section is optional; a workspace without the file runs with the
//! defaults below. Twilio credentials can also come from the environment so
//! they never have to be written into the workspace.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::auth::hash_password;

pub const CONFIG_FILE: &str = "academy.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcademyConfig {
    #[serde(default)]
    pub academy: AcademySection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub sms: SmsSection,
    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademySection {
    /// Shown in SMS messages and on report images
    #[serde(default = "default_academy_name")]
    pub name: String,
}

impl Default for AcademySection {
    fn default() -> Self {
        Self {
            name: default_academy_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
    #[serde(default = "default_operators")]
    pub operators: Vec<OperatorEntry>,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            session_ttl_days: default_session_ttl_days(),
            operators: default_operators(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorEntry {
    pub username: String,
    /// Hex SHA-256 of the password
    pub password_sha256: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsBackend {
    /// Log messages instead of sending them
    #[default]
    Log,
    Twilio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsSection {
    #[serde(default)]
    pub backend: SmsBackend,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from: Option<String>,
    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,
    /// Placeholders: `{name}`, `{expected_time}`, `{academy}`
    #[serde(default = "default_sms_template")]
    pub template: String,
}

impl Default for SmsSection {
    fn default() -> Self {
        Self {
            backend: SmsBackend::default(),
            account_sid: None,
            auth_token: None,
            from: None,
            base_url: default_twilio_base_url(),
            template: default_sms_template(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    /// Headless browser (or any rasteriser) used to turn report HTML into PNG
    pub command: Option<String>,
    /// Placeholders: `{html}`, `{png}`, `{url}`, `{width}`, `{height}`
    #[serde(default = "default_report_args")]
    pub args: Vec<String>,
    #[serde(default = "default_report_width")]
    pub width: u32,
    #[serde(default = "default_report_height")]
    pub height: u32,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            command: None,
            args: default_report_args(),
            width: default_report_width(),
            height: default_report_height(),
        }
    }
}

fn default_academy_name() -> String {
    "Academy".to_string()
}

fn default_session_ttl_days() -> i64 {
    30
}

fn default_display_name() -> String {
    "Teacher".to_string()
}

pub const DEFAULT_OPERATOR: &str = "admin";

/// Ten years.
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

fn default_operators() -> Vec<OperatorEntry> {
    vec![OperatorEntry {
        username: DEFAULT_OPERATOR.to_string(),
        password_sha256: hash_password(DEFAULT_OPERATOR),
        display_name: default_display_name(),
    }]
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_sms_template() -> String {
    "[{academy}] {name} has not arrived yet (expected {expected_time}).".to_string()
}

fn default_report_args() -> Vec<String> {
    vec![
        "--headless".to_string(),
        "--disable-gpu".to_string(),
        "--hide-scrollbars".to_string(),
        "--screenshot={png}".to_string(),
        "--window-size={width},{height}".to_string(),
        "{url}".to_string(),
    ]
}

fn default_report_width() -> u32 {
    900
}

fn default_report_height() -> u32 {
    800
}

impl AcademyConfig {
    /// Loads `academy.toml` from the workspace, falling back to defaults when
    /// the file does not exist, then applies environment overrides.
    pub fn load(workspace: &Path) -> Result<Self, ConfigError> {
        let path = workspace.join(CONFIG_FILE);
        let mut config = if path.is_file() {
            let display = path.to_string_lossy().to_string();
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: display.clone(),
                source,
            })?;
            Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                path: display,
                source,
            })?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("TWILIO_ACCOUNT_SID") {
            self.sms.account_sid = Some(v);
        }
        if let Some(v) = get("TWILIO_AUTH_TOKEN") {
            self.sms.auth_token = Some(v);
        }
        if let Some(v) = get("TWILIO_FROM") {
            self.sms.from = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.operators.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.operators must list at least one operator".to_string(),
            ));
        }
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&self.auth.session_ttl_days) {
            return Err(ConfigError::Invalid(format!(
                "auth.session_ttl_days must be between 1 and {}",
                MAX_SESSION_TTL_DAYS
            )));
        }
        if self.sms.backend == SmsBackend::Twilio {
            for (key, value) in [
                ("account_sid", &self.sms.account_sid),
                ("auth_token", &self.sms.auth_token),
                ("from", &self.sms.from),
            ] {
                if value.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "sms.{} is required for the twilio backend",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn uses_default_operator(&self) -> bool {
        self.auth
            .operators
            .iter()
            .any(|o| o.username == DEFAULT_OPERATOR && o.password_sha256 == hash_password(DEFAULT_OPERATOR))
    }
}
