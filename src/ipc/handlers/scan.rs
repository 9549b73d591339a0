use super::checkin::outcome_json;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_session};
use crate::ipc::types::{AppState, Request};
use crate::scan::TextPayloadDecoder;
use crate::session::ScanOutcome;
use serde_json::json;

fn scan_start(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state)?;
    session.scan.start();
    Ok(json!({ "scanning": true }))
}

fn scan_stop(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state)?;
    session.scan.stop();
    Ok(json!({ "scanning": false }))
}

fn scan_submit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let payload = get_required_str(params, "payload")?;
    let session = require_session(state)?;
    if !session.scan.is_active() {
        return Err(HandlerErr::new("scan_inactive", "start scan mode first"));
    }

    Ok(
        match session.submit_scan(&TextPayloadDecoder, payload.as_bytes())? {
            ScanOutcome::NoCode => json!({
                "status": "noCode",
                "message": "no QR code detected in the captured frame",
            }),
            ScanOutcome::Repeat(code) => json!({
                "status": "repeat",
                "payload": code,
            }),
            ScanOutcome::Checked { payload, outcome } => {
                let mut v = outcome_json(&outcome, session.attendance().len());
                v["payload"] = json!(payload);
                v
            }
        },
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "scan.start" => scan_start(state),
        "scan.stop" => scan_stop(state),
        "scan.submit" => scan_submit(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
