#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classroomd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

/// Spawns a sidecar with `workspace` already selected.
pub fn spawn_with_workspace(workspace: &std::path::Path) -> Sidecar {
    let mut s = spawn_sidecar();
    s.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    s
}

pub fn teacher(id: &str) -> serde_json::Value {
    json!({ "id": id, "role": "teacher" })
}

pub fn student(id: &str) -> serde_json::Value {
    json!({ "id": id, "role": "student", "displayName": id.to_uppercase() })
}

pub fn admin(id: &str) -> serde_json::Value {
    json!({ "id": id, "role": "admin" })
}

impl Sidecar {
    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Returns the error code of a request expected to fail.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    pub fn create_classroom(&mut self, teacher_id: &str, name: &str) -> (String, String) {
        let res = self.ok(
            "classrooms.create",
            json!({ "actor": teacher(teacher_id), "name": name }),
        );
        let c = &res["classroom"];
        (
            c["id"].as_str().expect("classroom id").to_string(),
            c["pin"].as_str().expect("pin").to_string(),
        )
    }

    pub fn join(&mut self, student_id: &str, pin: &str) -> serde_json::Value {
        self.ok(
            "classrooms.join",
            json!({ "actor": student(student_id), "pin": pin }),
        )
    }

    pub fn create_lesson(
        &mut self,
        teacher_id: &str,
        classroom_id: &str,
        title: &str,
        video_ref: Option<&str>,
    ) -> String {
        let res = self.ok(
            "lessons.create",
            json!({
                "actor": teacher(teacher_id),
                "classroomId": classroom_id,
                "title": title,
                "videoRef": video_ref,
            }),
        );
        res["lesson"]["id"].as_str().expect("lesson id").to_string()
    }

    pub fn create_assignment(
        &mut self,
        teacher_id: &str,
        classroom_id: &str,
        title: &str,
        lesson_id: Option<&str>,
    ) -> String {
        let res = self.ok(
            "assignments.create",
            json!({
                "actor": teacher(teacher_id),
                "classroomId": classroom_id,
                "title": title,
                "lessonId": lesson_id,
            }),
        );
        res["assignment"]["id"]
            .as_str()
            .expect("assignment id")
            .to_string()
    }
}
