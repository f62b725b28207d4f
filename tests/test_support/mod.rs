#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub const WEDNESDAY: &str = "2024-06-12";

/// A running `academyd` speaking line-JSON over its pipes.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub token: Option<String>,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn temp_workspace() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("academyd-test")
        .tempdir()
        .expect("create temp workspace")
}

/// Spawns the daemon with its clock pinned to `now`.
pub fn spawn_sidecar(now: &str) -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_academyd");
    let mut child = Command::new(exe)
        .env("ACADEMYD_NOW", now)
        .env_remove("ACADEMYD_WORKSPACE")
        .env_remove("TWILIO_ACCOUNT_SID")
        .env_remove("TWILIO_AUTH_TOKEN")
        .env_remove("TWILIO_FROM")
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn academyd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
        token: None,
    }
}

/// Spawns, selects `workspace` and logs in as the default operator.
pub fn open_session(now: &str, workspace: &Path) -> Sidecar {
    let mut sc = spawn_sidecar(now);
    sc.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let login = sc.ok(
        "auth.login",
        json!({ "username": "admin", "password": "admin" }),
    );
    sc.token = Some(
        login
            .get("token")
            .and_then(|v| v.as_str())
            .expect("token")
            .to_string(),
    );
    sc
}

impl Sidecar {
    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        self.send_bytes(line.as_bytes())
    }

    /// Writes `bytes` plus a newline and reads one response line.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> serde_json::Value {
        self.stdin.write_all(bytes).expect("write request");
        self.stdin.write_all(b"\n").expect("write newline");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(
            !out.trim().is_empty(),
            "empty response for {}",
            String::from_utf8_lossy(bytes)
        );
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(token) = &self.token {
            payload["token"] = json!(token);
        }
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(serde_json::Value::Null)
    }

    /// Expects a failure and returns `(code, status)`.
    pub fn err(&mut self, method: &str, params: serde_json::Value) -> (String, u64) {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        let error = value.get("error").cloned().unwrap_or_default();
        (
            error
                .get("code")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            error.get("status").and_then(|v| v.as_u64()).unwrap_or(0),
        )
    }

    pub fn create_student(&mut self, name: &str, phone: Option<&str>) -> String {
        let created = self.ok(
            "students.create",
            json!({ "name": name, "grade": "10", "parentPhone": phone }),
        );
        created
            .get("id")
            .and_then(|v| v.as_str())
            .expect("student id")
            .to_string()
    }
}

pub fn str_field<'a>(v: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(|v| v.as_str())
}

pub fn array<'a>(v: &'a serde_json::Value, key: &str) -> &'a Vec<serde_json::Value> {
    v.get(key)
        .and_then(|v| v.as_array())
        .unwrap_or_else(|| panic!("{} is not an array in {}", key, v))
}
