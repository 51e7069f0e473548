use crate::ipc::error::{core_err, err, ok};
use crate::ipc::helpers::{actor, db_conn, opt_i64, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::submissions;
use serde_json::{json, Value as JsonValue};

fn handle_submit(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let assignment_id = required_str(req, "assignmentId")?;
    let content = opt_str(req, "content")?;
    let document_ref = opt_str(req, "documentRef")?;
    let outcome = submissions::submit(
        conn,
        &actor,
        &assignment_id,
        content.as_deref(),
        document_ref.as_deref(),
    )
    .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!(outcome)))
}

/// Any JSON number is accepted as a grade; whole values in range pass
/// through, anything else is an invalid grade rather than a malformed request.
fn grade_param(req: &Request) -> Result<i64, JsonValue> {
    let Some(v) = req.params.get("grade").filter(|v| v.is_number()) else {
        return Err(err(&req.id, "bad_params", "grade must be a number", None));
    };
    if let Some(n) = v.as_i64() {
        return Ok(n);
    }
    let range = submissions::MIN_GRADE as f64..=submissions::MAX_GRADE as f64;
    match v.as_f64() {
        Some(f) if f.fract() == 0.0 && range.contains(&f) => Ok(f as i64),
        _ => Err(err(
            &req.id,
            "invalid_argument",
            format!(
                "grade must be an integer in {}..={}",
                submissions::MIN_GRADE,
                submissions::MAX_GRADE
            ),
            None,
        )),
    }
}

fn handle_grade(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let submission_id = required_str(req, "submissionId")?;
    let grade = grade_param(req)?;
    let feedback = opt_str(req, "feedback")?;
    let expected_version = opt_i64(req, "expectedVersion")?;
    let submission = submissions::grade(
        conn,
        &actor,
        &submission_id,
        grade,
        feedback.as_deref(),
        expected_version,
    )
    .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "submission": submission })))
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let assignment_id = required_str(req, "assignmentId")?;
    let list = submissions::list_submissions(conn, &actor, &assignment_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "submissions": list })))
}

fn handle_mine(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    let conn = db_conn(state, req)?;
    let actor = actor(req)?;
    let assignment_id = required_str(req, "assignmentId")?;
    let mine = submissions::get_my_submission(conn, &actor, &assignment_id)
        .map_err(|e| core_err(&req.id, &e))?;
    Ok(ok(&req.id, json!({ "submission": mine })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "submissions.submit" => handle_submit(state, req),
        "submissions.grade" => handle_grade(state, req),
        "submissions.list" => handle_list(state, req),
        "submissions.mine" => handle_mine(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
