use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{actor, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use tracing::{info, warn};

fn require_admin(req: &Request) -> Result<(), JsonValue> {
    let actor = actor(req)?;
    if !actor.is_admin() {
        return Err(err(
            &req.id,
            "forbidden",
            "forbidden: backup requires an admin",
            None,
        ));
    }
    Ok(())
}

fn handle_export(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    require_admin(req)?;
    let Some(workspace) = state.workspace.clone() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let Some(conn) = state.db.as_ref() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let out_path = PathBuf::from(required_str(req, "outPath")?);

    let summary = backup::export_workspace_bundle(conn, &workspace, &out_path)
        .map_err(|e| err(&req.id, "io_failed", format!("{e:#}"), None))?;
    info!(path = %out_path.to_string_lossy(), bytes = summary.db_bytes, "workspace exported");
    Ok(ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path.to_string_lossy(),
            "bundleFormat": summary.bundle_format,
            "dbSha256": summary.db_sha256,
        }),
    ))
}

fn handle_import(state: &mut AppState, req: &Request) -> Result<JsonValue, JsonValue> {
    require_admin(req)?;
    let Some(workspace) = state.workspace.clone() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let in_path = PathBuf::from(required_str(req, "inPath")?);
    if !in_path.is_file() {
        return Err(err(&req.id, "not_found", "bundle file not found", None));
    }

    // The open connection must be dropped before the database file is replaced.
    state.db = None;
    let imported = backup::import_workspace_bundle(&in_path, &workspace);

    let conn = db::open_db(&workspace)
        .map_err(|e| err(&req.id, "db_open_failed", format!("{e:#}"), None))?;
    state.db = Some(conn);

    match imported {
        Ok(summary) => {
            info!(path = %in_path.to_string_lossy(), "workspace imported");
            Ok(ok(
                &req.id,
                json!({
                    "ok": true,
                    "workspacePath": workspace.to_string_lossy(),
                    "bundleFormatDetected": summary.bundle_format,
                    "dbSha256": summary.db_sha256,
                }),
            ))
        }
        Err(e) => {
            warn!(path = %in_path.to_string_lossy(), error = %e, "workspace import rejected");
            Err(err(&req.id, "import_failed", format!("{e:#}"), None))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "backup.export" => handle_export(state, req),
        "backup.import" => handle_import(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
