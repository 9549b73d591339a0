use serde_json::json;

use crate::roster::RosterError;
use crate::session::SessionError;
use crate::store::StoreError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        HandlerErr::new("db_query_failed", e.to_string())
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "attendance store failure");
        HandlerErr::new("store_failed", e.to_string())
    }
}

impl From<RosterError> for HandlerErr {
    fn from(e: RosterError) -> Self {
        match e {
            RosterError::MissingColumns(ref missing) => {
                let details = json!({ "missing": missing });
                HandlerErr::new("roster_invalid", e.to_string()).with_details(details)
            }
            RosterError::NoDefaultFile(_) => HandlerErr::new("not_found", e.to_string()),
            RosterError::Db(_) => HandlerErr::new("db_query_failed", e.to_string()),
            _ => HandlerErr::new("roster_invalid", e.to_string()),
        }
    }
}

impl From<SessionError> for HandlerErr {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Store(s) => s.into(),
            SessionError::Roster(r) => r.into(),
        }
    }
}
