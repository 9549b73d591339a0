use anyhow::Context;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

pub const CONFIG_FILE: &str = "checkind.toml";

/// `<workspace>/checkind.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub events: Vec<EventConfig>,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    pub name: String,
    pub access_code: String,
    /// Default roster file, relative to the workspace.
    #[serde(default)]
    pub roster: Option<String>,
    /// Keep attendance in this CSV log instead of the database.
    #[serde(default)]
    pub attendance_csv: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub users_csv: Option<String>,
}

impl AuthConfig {
    pub fn users_path(&self, workspace: &Path) -> Option<PathBuf> {
        self.users_csv.as_ref().map(|p| workspace.join(p))
    }
}

pub fn config_path(workspace: &Path) -> PathBuf {
    workspace.join(CONFIG_FILE)
}

/// `Ok(None)` when the workspace has no config file.
pub fn load_workspace_config(workspace: &Path) -> anyhow::Result<Option<WorkspaceConfig>> {
    let path = config_path(workspace);
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let cfg = parse_workspace_config(&text)
        .with_context(|| format!("invalid {}", path.to_string_lossy()))?;
    Ok(Some(cfg))
}

/// Attendance logs live inside the workspace so backups can carry them:
/// non-empty, relative, and free of `..`.
pub fn is_workspace_relative(raw: &str) -> bool {
    let t = raw.trim();
    !t.is_empty()
        && Path::new(t)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

pub fn parse_workspace_config(text: &str) -> anyhow::Result<WorkspaceConfig> {
    let cfg: WorkspaceConfig = toml::from_str(text)?;
    for ev in &cfg.events {
        if ev.name.trim().is_empty() {
            anyhow::bail!("event name must not be empty");
        }
        if ev.access_code.trim().is_empty() {
            anyhow::bail!("event '{}' has an empty access_code", ev.name);
        }
        if let Some(log) = ev.attendance_csv.as_deref() {
            if !is_workspace_relative(log) {
                anyhow::bail!(
                    "event '{}': attendance_csv '{}' must be a path inside the workspace",
                    ev.name,
                    log
                );
            }
        }
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_events_and_auth() {
        let cfg = parse_workspace_config(
            r#"
[auth]
users_csv = "users.csv"

[[events]]
name = "GALAU 3.0"
access_code = "1234"
roster = "ENTRY.xlsx"
attendance_csv = "galau_data.csv"

[[events]]
name = "SPORTS DAY"
access_code = "6666"
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.events.len(), 2);
        assert_eq!(cfg.events[0].roster.as_deref(), Some("ENTRY.xlsx"));
        assert_eq!(cfg.events[1].attendance_csv, None);
        assert_eq!(
            cfg.auth.users_path(Path::new("/ws")),
            Some(PathBuf::from("/ws/users.csv"))
        );
    }

    #[test]
    fn empty_file_is_default() {
        let cfg = parse_workspace_config("").expect("parse empty");
        assert!(cfg.events.is_empty());
        assert!(cfg.auth.users_csv.is_none());
    }

    #[test]
    fn attendance_log_must_stay_inside_workspace() {
        assert!(is_workspace_relative("night_data.csv"));
        assert!(is_workspace_relative("./logs/night_data.csv"));
        assert!(!is_workspace_relative("/data/night.csv"));
        assert!(!is_workspace_relative("logs/../../night.csv"));
        assert!(!is_workspace_relative("  "));

        let e = parse_workspace_config(
            "[[events]]\nname = \"X\"\naccess_code = \"1\"\nattendance_csv = \"../x.csv\"\n",
        );
        assert!(e.is_err());
    }

    #[test]
    fn blank_access_code_is_rejected() {
        let e = parse_workspace_config("[[events]]\nname = \"X\"\naccess_code = \" \"\n");
        assert!(e.is_err());
    }
}
