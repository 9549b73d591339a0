use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::error::HandlerErr;
use super::types::AppState;
use crate::session::Session;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

/// Present, string-typed and non-blank after trimming; blank reads as absent.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_workspace(state: &AppState) -> Result<&Path, HandlerErr> {
    state
        .workspace
        .as_deref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_session(state: &mut AppState) -> Result<&mut Session, HandlerErr> {
    state
        .session
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_session", "open an event session first"))
}

/// Relative paths from the front end resolve against the workspace.
pub fn resolve_path(workspace: &Path, raw: &str) -> PathBuf {
    let p = PathBuf::from(raw);
    if p.is_absolute() {
        p
    } else {
        workspace.join(p)
    }
}

pub fn write_output(out: &Path, bytes: &[u8]) -> Result<(), HandlerErr> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            HandlerErr::new("export_failed", format!("failed to create directory: {}", e))
        })?;
    }
    std::fs::write(out, bytes).map_err(|e| {
        HandlerErr::new(
            "export_failed",
            format!("failed to write {}: {}", out.to_string_lossy(), e),
        )
    })
}
