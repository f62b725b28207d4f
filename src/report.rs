//! Daily report images.
//!
//! A report is rendered to HTML here and rasterised by an external command
//! (normally a headless browser). Output paths are fixed per log id so a
//! rendered image can be served again without re-rendering.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::config::ReportSection;
use crate::model::{DailyLog, Student};

pub const REPORTS_DIR: &str = "reports";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no report command configured")]
    Unavailable,
    #[error("report io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("report command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("report command produced no image at {0}")]
    NoOutput(String),
}

pub trait ReportRenderer {
    fn render(
        &self,
        student: &Student,
        log: &DailyLog,
        html_path: &Path,
        png_path: &Path,
    ) -> Result<(), RenderError>;
}

pub fn html_path(workspace: &Path, log_id: &str) -> PathBuf {
    workspace.join(REPORTS_DIR).join(format!("log_{}.html", log_id))
}

pub fn image_path(workspace: &Path, log_id: &str) -> PathBuf {
    workspace.join(REPORTS_DIR).join(format!("log_{}.png", log_id))
}

pub fn image_url(log_id: &str) -> String {
    format!("/static/reports/log_{}.png", log_id)
}

pub fn share_text(student_name: &str) -> String {
    format!("{} 학생 수업 리포트입니다.", student_name)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            _ => out.push(c),
        }
    }
    out
}

fn mark(done: bool) -> &'static str {
    if done {
        "&#10003;"
    } else {
        "&#8212;"
    }
}

pub fn render_html(academy: &str, student: &Student, log: &DailyLog) -> String {
    let mut tasks = String::new();
    for t in &log.tasks {
        tasks.push_str(&format!(
            "<tr><td>{}</td><td class=\"c\">{}</td><td class=\"c\">{}</td></tr>\n",
            escape(&t.content),
            mark(t.grading_done),
            mark(t.review_done)
        ));
    }
    if log.tasks.is_empty() {
        tasks.push_str("<tr><td colspan=\"3\" class=\"c\">-</td></tr>\n");
    }

    let f = &log.fields;
    let mut extra = String::new();
    for (label, value) in [
        ("Attendance", &f.attendance_status),
        ("Absence reason", &f.absence_reason),
        ("Follow-up", &f.follow_up_action),
        ("Make-up class", &f.makeup_class_note),
        ("Exam result", &f.exam_result),
    ] {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            extra.push_str(&format!(
                "<div class=\"row\"><span class=\"k\">{}</span><span>{}</span></div>\n",
                label,
                escape(v)
            ));
        }
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
body {{ font-family: sans-serif; margin: 24px; color: #222; }}
h1 {{ font-size: 22px; margin: 0 0 4px; }}
.sub {{ color: #666; margin-bottom: 16px; }}
table {{ width: 100%; border-collapse: collapse; margin-bottom: 16px; }}
th, td {{ border: 1px solid #ddd; padding: 6px 8px; }}
.c {{ text-align: center; width: 80px; }}
.row {{ margin: 4px 0; }}
.k {{ display: inline-block; width: 140px; color: #666; }}
.note {{ background: #f7f7f7; padding: 12px; border-radius: 6px; }}
</style>
</head>
<body>
<h1>{academy}</h1>
<div class="sub">{name} ({grade}) &middot; {date} &middot; {state}</div>
<table>
<tr><th>Task</th><th class="c">Graded</th><th class="c">Reviewed</th></tr>
{tasks}</table>
{extra}<div class="note">{note}</div>
</body>
</html>
"#,
        academy = escape(academy),
        name = escape(&student.name),
        grade = escape(&student.grade),
        date = escape(&log.date),
        state = if log.is_completed() { "complete" } else { "in progress" },
        tasks = tasks,
        extra = extra,
        note = escape(f.teacher_note.as_deref().unwrap_or("")),
    )
}

/// Writes the HTML and runs the configured rasteriser command.
pub struct CommandRenderer {
    academy: String,
    command: Option<String>,
    args: Vec<String>,
    width: u32,
    height: u32,
}

impl CommandRenderer {
    pub fn new(academy: &str, section: &ReportSection) -> Self {
        Self {
            academy: academy.to_string(),
            command: section
                .command
                .clone()
                .filter(|c| !c.trim().is_empty()),
            args: section.args.clone(),
            width: section.width,
            height: section.height,
        }
    }

    fn expand(&self, arg: &str, html_path: &Path, png_path: &Path) -> String {
        let url = format!(
            "file:///{}",
            html_path
                .to_string_lossy()
                .replace('\\', "/")
                .trim_start_matches('/')
        );
        arg.replace("{html}", &html_path.to_string_lossy())
            .replace("{png}", &png_path.to_string_lossy())
            .replace("{url}", &url)
            .replace("{width}", &self.width.to_string())
            .replace("{height}", &self.height.to_string())
    }
}

impl ReportRenderer for CommandRenderer {
    fn render(
        &self,
        student: &Student,
        log: &DailyLog,
        html_path: &Path,
        png_path: &Path,
    ) -> Result<(), RenderError> {
        let Some(command) = self.command.as_deref() else {
            return Err(RenderError::Unavailable);
        };
        if let Some(parent) = png_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(html_path, render_html(&self.academy, student, log))?;
        if png_path.exists() {
            std::fs::remove_file(png_path)?;
        }

        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| self.expand(a, html_path, png_path))
            .collect();
        tracing::debug!(%command, ?args, "rendering report");
        let output = Command::new(command).args(&args).output()?;
        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !png_path.is_file() {
            return Err(RenderError::NoOutput(png_path.to_string_lossy().to_string()));
        }
        Ok(())
    }
}
