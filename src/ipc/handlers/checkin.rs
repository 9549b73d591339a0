use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_session};
use crate::ipc::types::{AppState, Request};
use crate::matcher::CheckInOutcome;
use serde_json::json;

/// Operator-facing line for a check-in result.
pub fn outcome_message(outcome: &CheckInOutcome) -> String {
    match outcome {
        CheckInOutcome::Admitted(r) => format!("{} marked present", r.name),
        CheckInOutcome::AlreadyPresent(r) => format!("{} is already marked present", r.name),
        CheckInOutcome::NotFound => "no record found with that ID or Matric".to_string(),
        CheckInOutcome::EmptyQuery => "empty input".to_string(),
    }
}

pub fn outcome_json(outcome: &CheckInOutcome, total: usize) -> serde_json::Value {
    json!({
        "status": outcome.status(),
        "record": outcome.record(),
        "message": outcome_message(outcome),
        "total": total,
    })
}

fn checkin(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let query = get_required_str(params, "query")?;
    let session = require_session(state)?;
    let outcome = session.check_in(&query)?;
    if outcome == CheckInOutcome::EmptyQuery {
        return Err(HandlerErr::new("empty_query", outcome_message(&outcome)));
    }
    Ok(outcome_json(&outcome, session.attendance().len()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "checkin" => Some(match checkin(state, &req.params) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
