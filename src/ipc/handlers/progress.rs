use crate::config;
use crate::ipc::error::{core_err, ok};
use crate::ipc::helpers::{actor, db_conn, required_f64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::progress;
use serde_json::{json, Value as JsonValue};

fn handle_report(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let watched = required_f64(req, "watchedDurationSeconds")?;
    let total = required_f64(req, "totalDurationSeconds")?;
    let setup = config::load_progress_setup(conn);
    let p = progress::report_progress(conn, &setup, &actor, &lesson_id, watched, total)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "progress": p })))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let p = progress::get_progress(conn, &actor, &lesson_id).map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "progress": p })))
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let rows = progress::list_progress(conn, &actor, &classroom_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "progress": rows })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "progress.report" => handle_report(state, req),
        "progress.get" => handle_get(state, req),
        "progress.list" => handle_list(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
