use crate::auth::hash_access_code;
use crate::config;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, require_db, require_workspace};
use crate::ipc::types::{AppState, Request};
use crate::session::open_store;
use serde_json::json;

fn events_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "events": [] }));
    };
    let workspace = require_workspace(state)?;

    let mut out = Vec::new();
    for ev in db::list_events(conn)? {
        let roster_count = db::roster_count(conn, &ev.id)?;
        // Counting is best-effort: an unreadable CSV log shows as null.
        let attendance_count = match state.session.as_ref() {
            Some(s) if s.event.id == ev.id => Some(s.attendance().len()),
            _ => open_store(workspace, &ev)
                .and_then(|mut store| store.load())
                .map(|rows| rows.len())
                .ok(),
        };
        let mut v = ev.to_json();
        v["rosterCount"] = json!(roster_count);
        v["attendanceCount"] = json!(attendance_count);
        out.push(v);
    }
    Ok(json!({ "events": out }))
}

fn events_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", "name must not be empty"));
    }
    let access_code = get_required_str(params, "accessCode")?;
    if access_code.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "accessCode must not be empty"));
    }
    if db::find_event_by_name(conn, &name)?.is_some() {
        return Err(HandlerErr::new("conflict", "an event with this name already exists")
            .with_details(json!({ "name": name })));
    }

    let roster_path = get_optional_str(params, "rosterPath");
    let attendance_csv = get_optional_str(params, "attendanceCsv");
    if let Some(log) = attendance_csv.as_deref() {
        if !config::is_workspace_relative(log) {
            return Err(HandlerErr::new(
                "bad_params",
                "attendanceCsv must be a relative path inside the workspace",
            )
            .with_details(json!({ "attendanceCsv": log })));
        }
    }
    let event_id = db::create_event(
        conn,
        &name,
        &hash_access_code(&access_code),
        roster_path.as_deref(),
        attendance_csv.as_deref(),
    )?;
    tracing::info!(event = %name, id = %event_id, "event created");
    Ok(json!({ "eventId": event_id, "name": name }))
}

fn events_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let event_id = get_required_str(params, "eventId")?;
    let conn = require_db(state)?;
    if !db::delete_event(conn, &event_id)? {
        return Err(HandlerErr::new("not_found", "event not found"));
    }
    if state
        .session
        .as_ref()
        .is_some_and(|s| s.event.id == event_id)
    {
        state.session = None;
    }
    tracing::info!(id = %event_id, "event deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "events.list" => events_list(state),
        "events.create" => events_create(state, &req.params),
        "events.delete" => events_delete(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
