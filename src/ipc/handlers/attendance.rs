use crate::export;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_required_str, require_session, require_workspace, resolve_path, write_output,
};
use crate::ipc::types::{AppState, Request};
use crate::store::format_timestamp;
use serde_json::json;

const CLEAR_CONFIRMATION: &str = "CLEAR";

fn attendance_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state)?;
    let set = session.attendance();
    let entries: Vec<serde_json::Value> = set
        .entries()
        .iter()
        .enumerate()
        .map(|(i, e)| {
            json!({
                "no": i + 1,
                "name": e.record.name,
                "matric": e.record.matric,
                "id": e.record.id,
                "checkedInAt": e.checked_in_at.as_ref().map(format_timestamp),
            })
        })
        .collect();
    Ok(json!({ "entries": entries, "total": set.len() }))
}

fn attendance_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = get_required_str(params, "key")?;
    if key.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "enter a value to delete"));
    }
    let session = require_session(state)?;
    let removed = session.remove(&key)?;
    if removed > 0 {
        tracing::info!(event = %session.event.name, key = %key.trim(), removed, "attendance removed");
    }
    Ok(json!({ "removed": removed, "total": session.attendance().len() }))
}

fn attendance_clear(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let confirmed = params
        .get("confirm")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s.trim().eq_ignore_ascii_case(CLEAR_CONFIRMATION));
    if !confirmed {
        return Err(HandlerErr::new(
            "confirm_required",
            format!("type {} to confirm", CLEAR_CONFIRMATION),
        ));
    }
    let session = require_session(state)?;
    session.clear()?;
    Ok(json!({ "cleared": true }))
}

fn attendance_export(
    state: &mut AppState,
    params: &serde_json::Value,
    render: fn(&crate::matcher::AttendanceSet) -> anyhow::Result<Vec<u8>>,
) -> Result<serde_json::Value, HandlerErr> {
    let raw = get_required_str(params, "outPath")?;
    if raw.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "missing outPath"));
    }
    let out = resolve_path(require_workspace(state)?, raw.trim());
    let session = require_session(state)?;
    let bytes = render(session.attendance()).map_err(|e| {
        HandlerErr::new("export_failed", format!("{e:#}"))
    })?;
    write_output(&out, &bytes)?;
    Ok(json!({
        "path": out.to_string_lossy(),
        "rows": session.attendance().len(),
        "bytes": bytes.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.list" => attendance_list(state),
        "attendance.delete" => attendance_delete(state, &req.params),
        "attendance.clear" => attendance_clear(state, &req.params),
        "attendance.exportXlsx" => {
            attendance_export(state, &req.params, export::to_spreadsheet_bytes)
        }
        "attendance.exportCsv" => attendance_export(state, &req.params, export::to_csv_bytes),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
