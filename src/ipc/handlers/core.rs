use crate::auth::{hash_access_code, UserDirectory};
use crate::config;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "event": state.session.as_ref().map(|s| s.event.name.clone()),
        }),
    )
}

pub(crate) struct ConfigImport {
    pub events_imported: usize,
    pub users: Option<UserDirectory>,
    pub warnings: Vec<String>,
}

/// Applies `checkind.toml` to a freshly opened workspace. Problems are
/// collected as warnings; they never keep the workspace closed.
pub(crate) fn import_workspace_config(conn: &Connection, workspace: &Path) -> ConfigImport {
    let mut out = ConfigImport {
        events_imported: 0,
        users: None,
        warnings: Vec::new(),
    };
    let cfg = match config::load_workspace_config(workspace) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => return out,
        Err(e) => {
            out.warnings.push(format!("{e:#}"));
            return out;
        }
    };

    for ev in &cfg.events {
        match db::upsert_event(
            conn,
            ev.name.trim(),
            &hash_access_code(&ev.access_code),
            ev.roster.as_deref(),
            ev.attendance_csv.as_deref(),
        ) {
            Ok(_) => out.events_imported += 1,
            Err(e) => out.warnings.push(format!("event '{}': {}", ev.name, e)),
        }
    }

    if let Some(users_path) = cfg.auth.users_path(workspace) {
        match UserDirectory::from_path(&users_path) {
            Ok(dir) => {
                tracing::info!(users = dir.len(), "operator directory loaded");
                out.users = Some(dir);
            }
            Err(e) => out.warnings.push(format!(
                "users file {}: {}",
                users_path.to_string_lossy(),
                e
            )),
        }
    }
    out
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            let imported = import_workspace_config(&conn, &path);
            for w in &imported.warnings {
                tracing::warn!(workspace = %path.display(), "config: {}", w);
            }
            tracing::info!(
                workspace = %path.display(),
                events = imported.events_imported,
                "workspace selected"
            );

            state.session = None;
            state.users = imported.users;
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "eventsImported": imported.events_imported,
                    "configWarnings": imported.warnings,
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
