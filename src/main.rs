mod auth;
mod clock;
mod config;
mod db;
mod ipc;
mod model;
mod notify;
mod report;
mod status;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, FixedClock, SystemClock};

/// Academy attendance and daily-log sidecar. Reads one JSON request per line
/// on stdin and writes one JSON response per line on stdout.
#[derive(Debug, Parser)]
#[command(name = "academyd", version)]
struct Cli {
    /// Workspace directory to select at startup.
    #[arg(long, env = "ACADEMYD_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Pin the clock to a local instant, e.g. 2024-06-12T15:00.
    #[arg(long, env = "ACADEMYD_NOW")]
    now: Option<String>,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn build_clock(now: Option<&str>) -> anyhow::Result<Box<dyn Clock>> {
    match now {
        Some(raw) => {
            let instant = clock::parse_instant(raw)
                .with_context(|| format!("invalid --now value {raw:?}, expected YYYY-MM-DDTHH:MM[:SS]"))?;
            tracing::info!(now = %instant, "clock pinned");
            Ok(Box::new(FixedClock(instant)))
        }
        None => Ok(Box::new(SystemClock)),
    }
}

fn write_line(stdout: &mut impl Write, value: &serde_json::Value) {
    let line = serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}

/// No id to echo back for a line that never parsed.
fn bad_json(message: String) -> serde_json::Value {
    serde_json::json!({
        "ok": false,
        "error": {
            "code": "bad_json",
            "message": message,
            "status": 400,
        }
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut state = ipc::AppState::new(build_clock(cli.now.as_deref())?);
    if let Some(path) = &cli.workspace {
        ipc::select_workspace(&mut state, path)
            .with_context(|| format!("failed to select workspace {}", path.display()))?;
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stdin");
                break;
            }
        }
        let line = match String::from_utf8(std::mem::take(&mut buf)) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "request line is not utf-8");
                write_line(&mut stdout, &bad_json(format!("request is not valid utf-8: {}", e)));
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable request line");
                write_line(&mut stdout, &bad_json(e.to_string()));
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        write_line(&mut stdout, &resp);
    }
    Ok(())
}
