use crate::identity::{Actor, Role};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::Value as JsonValue;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent or null reads as `None`; any other non-string is rejected.
pub fn opt_str(req: &Request, key: &str) -> Result<Option<String>, JsonValue> {
    match req.params.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be string or null", key),
            None,
        )),
    }
}

/// Patch semantics: key absent => untouched, null => clear, string => set.
pub fn patch_str(req: &Request, key: &str) -> Result<Option<Option<String>>, JsonValue> {
    match req.params.get(key) {
        None => Ok(None),
        Some(JsonValue::Null) => Ok(Some(None)),
        Some(JsonValue::String(s)) => Ok(Some(Some(s.clone()))),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be string or null", key),
            None,
        )),
    }
}

pub fn opt_i64(req: &Request, key: &str) -> Result<Option<i64>, JsonValue> {
    match req.params.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be integer", key),
                None,
            )
        }),
    }
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a number", key), None))
}

/// The acting principal from `params.actor`.
pub fn actor(req: &Request) -> Result<Actor, JsonValue> {
    let bad = |msg: &str| err(&req.id, "bad_params", msg, None);
    let Some(obj) = req.params.get("actor").and_then(|v| v.as_object()) else {
        return Err(bad("missing actor"));
    };
    let id = obj
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad("actor.id must be a non-empty string"))?;
    let role = obj
        .get("role")
        .and_then(|v| v.as_str())
        .and_then(Role::parse)
        .ok_or_else(|| bad("actor.role must be student, teacher or admin"))?;
    let display_name = obj
        .get("displayName")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let mut actor = Actor::new(id, role);
    actor.display_name = display_name;
    Ok(actor)
}
