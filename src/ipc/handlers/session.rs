use crate::auth::check_credentials;
use crate::db::{self, EventRow};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, require_db, require_workspace};
use crate::ipc::types::{AppState, Request};
use crate::roster::{RosterSource, StoredRoster};
use crate::session::{open_store, Session};
use serde_json::json;

fn auth_failed() -> HandlerErr {
    HandlerErr::new("auth_failed", "incorrect credentials")
}

/// Resolves which event the caller may open, checking either the event's
/// access code or an operator account.
fn authorize(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<(EventRow, Option<String>), HandlerErr> {
    let conn = require_db(state)?;
    let event_id = get_optional_str(params, "eventId");

    if let Some(username) = get_optional_str(params, "username") {
        let password = params
            .get("password")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let Some(users) = state.users.as_ref() else {
            return Err(HandlerErr::new(
                "auth_failed",
                "operator logins are not configured for this workspace",
            ));
        };
        let Some(operator) = users.check(&username, password) else {
            tracing::warn!(username = %username, "operator login rejected");
            return Err(auth_failed());
        };
        let event = match (event_id, operator.event.as_deref()) {
            (Some(id), _) => db::find_event(conn, &id)?,
            (None, Some(name)) => db::find_event_by_name(conn, name)?,
            (None, None) => {
                return Err(HandlerErr::new(
                    "bad_params",
                    "operator has no assigned event; pass eventId",
                ))
            }
        };
        let event = event.ok_or_else(|| HandlerErr::new("not_found", "event not found"))?;
        return Ok((event, Some(operator.username)));
    }

    let Some(event_id) = event_id else {
        return Err(HandlerErr::new("bad_params", "missing eventId or username"));
    };
    let event = db::find_event(conn, &event_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "event not found"))?;
    let code = params
        .get("accessCode")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if !check_credentials(&event.access_hash, code) {
        tracing::warn!(event = %event.name, "access code rejected");
        return Err(auth_failed());
    }
    Ok((event, None))
}

fn session_summary(session: &Session) -> serde_json::Value {
    json!({
        "open": true,
        "event": session.event.to_json(),
        "operator": session.operator,
        "store": session.store_kind(),
        "rosterCount": session.roster().len(),
        "attendanceCount": session.attendance().len(),
        "scanning": session.scan.is_active(),
    })
}

fn session_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (event, operator) = authorize(state, params)?;
    let conn = require_db(state)?;
    let workspace = require_workspace(state)?;
    let roster = StoredRoster::new(conn, event.id.clone()).load_roster()?;
    let store = open_store(workspace, &event)?;
    let session = Session::open(event, operator, roster, store)?;
    let summary = session_summary(&session);
    state.session = Some(session);
    Ok(summary)
}

fn session_status(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    Ok(match state.session.as_ref() {
        Some(s) => session_summary(s),
        None => json!({ "open": false }),
    })
}

fn session_close(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let closed = state.session.take();
    if let Some(s) = closed.as_ref() {
        tracing::info!(event = %s.event.name, "session closed");
    }
    Ok(json!({ "closed": closed.is_some() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.open" => session_open(state, &req.params),
        "session.status" => session_status(state),
        "session.close" => session_close(state),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
