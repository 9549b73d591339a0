use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, require_db, require_session, require_workspace,
    resolve_path,
};
use crate::ipc::types::{AppState, Request};
use crate::matcher::RosterRecord;
use crate::roster::{self, DefaultRoster, FileRoster, RosterSource, RosterUpdate, StoredRoster};
use serde_json::json;

const PREVIEW_ROWS: usize = 5;

fn active_event(state: &mut AppState) -> Result<(String, Option<String>), HandlerErr> {
    let s = require_session(state)?;
    Ok((s.event.id.clone(), s.event.roster_path.clone()))
}

/// Stores `records` as the event roster and hands them to the session.
fn install_roster(
    state: &mut AppState,
    event_id: &str,
    records: Vec<RosterRecord>,
) -> Result<usize, HandlerErr> {
    let conn = require_db(state)?;
    let n = roster::replace_stored(conn, event_id, &records)?;
    require_session(state)?.replace_roster(records);
    Ok(n)
}

/// Re-reads the stored roster into the session after an edit.
fn refresh_session_roster(state: &mut AppState, event_id: &str) -> Result<(), HandlerErr> {
    let conn = require_db(state)?;
    let records = StoredRoster::new(conn, event_id).load_roster()?;
    require_session(state)?.replace_roster(records);
    Ok(())
}

fn preview(records: &[RosterRecord]) -> serde_json::Value {
    json!(records.iter().take(PREVIEW_ROWS).collect::<Vec<_>>())
}

fn roster_import(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = get_required_str(params, "path")?;
    let (event_id, _) = active_event(state)?;
    let path = resolve_path(require_workspace(state)?, raw.trim());

    let records = FileRoster::new(&path).load_roster()?;
    let head = preview(&records);
    let imported = install_roster(state, &event_id, records)?;
    tracing::info!(path = %path.display(), imported, "roster imported");
    Ok(json!({
        "imported": imported,
        "sourcePath": path.to_string_lossy(),
        "preview": head,
    }))
}

fn roster_load_default(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (event_id, preferred) = active_event(state)?;
    let source = DefaultRoster::new(require_workspace(state)?, preferred);
    let path = source.resolve()?;

    let records = source.load_roster()?;
    let head = preview(&records);
    let imported = install_roster(state, &event_id, records)?;
    tracing::info!(path = %path.display(), imported, "default roster loaded");
    Ok(json!({
        "imported": imported,
        "sourcePath": path.to_string_lossy(),
        "preview": head,
    }))
}

fn roster_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let limit = params
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize);
    let session = require_session(state)?;
    let all = session.roster();
    let shown: Vec<&RosterRecord> = match limit {
        Some(n) => all.iter().take(n).collect(),
        None => all.iter().collect(),
    };
    Ok(json!({ "records": shown, "total": all.len() }))
}

fn roster_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = get_required_str(params, "key")?;
    if key.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "key must not be empty"));
    }
    let name = get_optional_str(params, "name");
    let matric = get_optional_str(params, "matric");
    let (event_id, _) = active_event(state)?;

    let conn = require_db(state)?;
    match roster::update_stored(conn, &event_id, &key, name.as_deref(), matric.as_deref())? {
        RosterUpdate::NotFound => Err(HandlerErr::new("not_found", "no record found to edit")),
        RosterUpdate::Unchanged(record) => Ok(json!({ "changed": false, "record": record })),
        RosterUpdate::Updated(record) => {
            refresh_session_roster(state, &event_id)?;
            tracing::info!(id = %record.id, "roster record updated");
            Ok(json!({ "changed": true, "record": record }))
        }
    }
}

fn roster_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = get_required_str(params, "key")?;
    if key.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "key must not be empty"));
    }
    let (event_id, _) = active_event(state)?;
    let removed = roster::delete_stored(require_db(state)?, &event_id, &key)?;
    if removed > 0 {
        refresh_session_roster(state, &event_id)?;
    }
    Ok(json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "roster.import" => roster_import(state, &req.params),
        "roster.loadDefault" => roster_load_default(state),
        "roster.list" => roster_list(state, &req.params),
        "roster.update" => roster_update(state, &req.params),
        "roster.delete" => roster_delete(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
