use crate::ipc::error::{core_err, ok};
use crate::ipc::helpers::{actor, db_conn, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::stats;
use serde_json::{json, Value as JsonValue};

fn handle_classroom(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let s = stats::classroom_stats(conn, &actor, &classroom_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!(s)))
}

fn handle_student(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let student_id = opt_str(req, "studentId")?;
    let s = stats::student_stats(conn, &actor, &classroom_id, student_id.as_deref())
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!(s)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "stats.classroom" => handle_classroom(state, req),
        "stats.student" => handle_student(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
