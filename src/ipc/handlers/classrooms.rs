use crate::classroom;
use crate::config;
use crate::ipc::error::{core_err, ok};
use crate::ipc::helpers::{actor, db_conn, opt_str, patch_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value as JsonValue};

fn handle_create(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let name = required_str(req, "name")?;
    let description = opt_str(req, "description")?;
    let setup = config::load_classroom_setup(conn);
    let c = classroom::create_classroom(conn, &setup, &actor, &name, description.as_deref())
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "classroom": c })))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let c = classroom::get_classroom(conn, &actor, &classroom_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "classroom": c })))
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let actor = actor(req)?;
    let Some(conn) = state.db.as_ref() else {
        return Ok(ok(&req.id, json!({ "classrooms": [] })));
    };
    let list = classroom::list_classrooms(conn, &actor).map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "classrooms": list })))
}

fn handle_rename(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let name = required_str(req, "name")?;
    let description = patch_str(req, "description")?;
    let c = classroom::rename_classroom(
        conn,
        &actor,
        &classroom_id,
        &name,
        description.as_ref().map(|d| d.as_deref()),
    )
    .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "classroom": c })))
}

fn handle_regenerate_pin(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let setup = config::load_classroom_setup(conn);
    let c = classroom::regenerate_pin(conn, &setup, &actor, &classroom_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "classroom": c })))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    classroom::delete_classroom(conn, &actor, &classroom_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

fn handle_join(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let pin = required_str(req, "pin")?;
    let outcome = classroom::join_by_pin(conn, &actor, &pin).map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!(outcome)))
}

fn handle_unenroll(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    // Students leaving omit studentId.
    let student_id = opt_str(req, "studentId")?.unwrap_or_else(|| actor.id.clone());
    classroom::unenroll(conn, &actor, &classroom_id, &student_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

fn handle_students(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let students = classroom::list_students(conn, &actor, &classroom_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "students": students })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "classrooms.create" => handle_create(state, req),
        "classrooms.get" => handle_get(state, req),
        "classrooms.list" => handle_list(state, req),
        "classrooms.rename" => handle_rename(state, req),
        "classrooms.regeneratePin" => handle_regenerate_pin(state, req),
        "classrooms.delete" => handle_delete(state, req),
        "classrooms.join" => handle_join(state, req),
        "classrooms.unenroll" => handle_unenroll(state, req),
        "classrooms.students" => handle_students(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
