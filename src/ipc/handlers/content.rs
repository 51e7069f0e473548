use crate::catalog::{self, AssignmentPatch, LessonPatch, NewAssignment, NewLesson};
use crate::ipc::error::{core_err, err, ok};
use crate::ipc::helpers::{actor, db_conn, opt_i64, opt_str, patch_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value as JsonValue};

fn handle_lessons_list(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let lessons = catalog::list_lessons(conn, &actor, &classroom_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "lessons": lessons })))
}

fn handle_lessons_open(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let lesson =
        catalog::get_lesson(conn, &actor, &lesson_id).map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "lesson": lesson })))
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let new = NewLesson {
        title: required_str(req, "title")?,
        description: opt_str(req, "description")?,
        video_ref: opt_str(req, "videoRef")?,
        notes_ref: opt_str(req, "notesRef")?,
        order: opt_i64(req, "order")?,
    };
    let lesson = catalog::create_lesson(conn, &actor, &classroom_id, new)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "lesson": lesson })))
}

fn handle_lessons_update(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let title = match patch_str(req, "title")? {
        Some(None) => return Err(err(&req.id, "bad_params", "title cannot be null", None)),
        Some(Some(t)) => Some(t),
        None => None,
    };
    let patch = LessonPatch {
        title,
        description: patch_str(req, "description")?,
        video_ref: patch_str(req, "videoRef")?,
        notes_ref: patch_str(req, "notesRef")?,
        order: opt_i64(req, "order")?,
    };
    let lesson = catalog::update_lesson(conn, &actor, &lesson_id, patch)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "lesson": lesson })))
}

fn handle_lessons_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let lesson_id = required_str(req, "lessonId")?;
    catalog::delete_lesson(conn, &actor, &lesson_id).map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let assignments = catalog::list_assignments(conn, &actor, &classroom_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "assignments": assignments })))
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let classroom_id = required_str(req, "classroomId")?;
    let new = NewAssignment {
        lesson_id: opt_str(req, "lessonId")?,
        title: required_str(req, "title")?,
        description: opt_str(req, "description")?.unwrap_or_default(),
        document_ref: opt_str(req, "documentRef")?,
        due_date: opt_str(req, "dueDate")?,
    };
    let assignment = catalog::create_assignment(conn, &actor, &classroom_id, new)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "assignment": assignment })))
}

fn handle_assignments_update(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let assignment_id = required_str(req, "assignmentId")?;
    let patch = AssignmentPatch {
        lesson_id: patch_str(req, "lessonId")?,
        title: opt_str(req, "title")?,
        description: opt_str(req, "description")?,
        document_ref: patch_str(req, "documentRef")?,
        due_date: patch_str(req, "dueDate")?,
    };
    let assignment = catalog::update_assignment(conn, &actor, &assignment_id, patch)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "assignment": assignment })))
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let assignment_id = required_str(req, "assignmentId")?;
    catalog::delete_assignment(conn, &actor, &assignment_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "lessons.list" => handle_lessons_list(state, req),
        "lessons.open" => handle_lessons_open(state, req),
        "lessons.create" => handle_lessons_create(state, req),
        "lessons.update" => handle_lessons_update(state, req),
        "lessons.delete" => handle_lessons_delete(state, req),
        "assignments.list" => handle_assignments_list(state, req),
        "assignments.create" => handle_assignments_create(state, req),
        "assignments.update" => handle_assignments_update(state, req),
        "assignments.delete" => handle_assignments_delete(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
