use crate::config::{self, ClassroomSetup, ProgressSetup, DEFAULT_PIN_SPACE, MAX_PIN_ATTEMPTS};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::actor;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use tracing::info;

#[derive(Clone, Copy)]
enum SetupSection {
    Progress,
    Classrooms,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "progress" => Some(Self::Progress),
            "classrooms" => Some(Self::Classrooms),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Progress => "setup.progress",
            Self::Classrooms => "setup.classrooms",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Progress => config::progress_setup_json(&ProgressSetup::default()),
        SetupSection::Classrooms => config::classroom_setup_json(&ClassroomSetup::default()),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Progress => match k.as_str() {
                "completionThreshold" => {
                    let t = v
                        .as_f64()
                        .filter(|t| config::valid_threshold(*t))
                        .ok_or_else(|| format!("{} must be a number in (0, 1]", k))?;
                    obj.insert(k.clone(), json!(t));
                }
                _ => return Err(format!("unknown progress field: {}", k)),
            },
            SetupSection::Classrooms => match k.as_str() {
                "pinSpace" => {
                    obj.insert(
                        k.clone(),
                        Value::from(parse_i64_range(v, k, 1, DEFAULT_PIN_SPACE as i64)?),
                    );
                }
                "pinMaxAttempts" => {
                    obj.insert(
                        k.clone(),
                        Value::from(parse_i64_range(v, k, 1, MAX_PIN_ATTEMPTS as i64)?),
                    );
                }
                _ => return Err(format!("unknown classrooms field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed stored values must not block reading setup.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Some(raw) = req.params.get("section").and_then(|v| v.as_str()) {
        let Some(section) = SetupSection::parse(raw) else {
            return err(&req.id, "bad_params", "unknown section", None);
        };
        return match load_section(conn, section) {
            Ok(v) => ok(&req.id, json!({ "section": v })),
            Err(e) => err(&req.id, "db_error", e.to_string(), None),
        };
    }
    let progress = match load_section(conn, SetupSection::Progress) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_error", e.to_string(), None),
    };
    let classrooms = match load_section(conn, SetupSection::Classrooms) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_error", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "progress": progress,
            "classrooms": classrooms,
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let actor = match actor(req) {
        Ok(a) => a,
        Err(e) => return e,
    };
    if !actor.is_admin() {
        return err(&req.id, "forbidden", "forbidden: setup requires an admin", None);
    }
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_error", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_error", e.to_string(), None);
    }
    info!(section = section.key(), by = %actor.id, "setup updated");
    ok(&req.id, json!({ "ok": true, "section": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
