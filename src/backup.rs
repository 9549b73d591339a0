use crate::config::is_workspace_relative;
use anyhow::{anyhow, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/checkind.sqlite3";
const CONFIG_ENTRY: &str = "config/checkind.toml";
const LOGS_PREFIX: &str = "logs";
const DB_FILE: &str = "checkind.sqlite3";
const CONFIG_FILE: &str = "checkind.toml";
pub const BUNDLE_FORMAT_V1: &str = "checkind-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub restored_logs: Vec<String>,
}

/// Packs the workspace database, its config and the given CSV attendance
/// logs (paths relative to the workspace; missing ones are skipped). A log
/// path that leaves the workspace is an error.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
    attendance_logs: &[String],
) -> anyhow::Result<ExportSummary> {
    if let Some(bad) = attendance_logs.iter().find(|rel| !is_workspace_relative(rel)) {
        return Err(anyhow!(
            "attendance log {} is outside the workspace and cannot be bundled",
            bad
        ));
    }
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let logs: Vec<&String> = attendance_logs
        .iter()
        .filter(|rel| workspace_path.join(rel.trim()).is_file())
        .collect();
    let config_path = workspace_path.join(CONFIG_FILE);
    let has_config = config_path.is_file();

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Local::now().to_rfc3339(),
        "hasConfig": has_config,
        "logs": logs,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;
    let mut entry_count = 1;

    copy_into_zip(&mut zip, opts, DB_ENTRY, &db_path)?;
    entry_count += 1;

    if has_config {
        copy_into_zip(&mut zip, opts, CONFIG_ENTRY, &config_path)?;
        entry_count += 1;
    }
    for rel in logs {
        let entry = log_entry_name(rel);
        copy_into_zip(&mut zip, opts, &entry, &workspace_path.join(rel.trim()))?;
        entry_count += 1;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count,
    })
}

/// `logs/<rel>` with separators normalized and `.` segments dropped.
fn log_entry_name(rel: &str) -> String {
    let normalized = rel.trim().replace('\\', "/");
    let parts: Vec<String> = Path::new(&normalized)
        .components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    format!("{}/{}", LOGS_PREFIX, parts.join("/"))
}

fn copy_into_zip(
    zip: &mut ZipWriter<File>,
    opts: FileOptions,
    entry: &str,
    src: &Path,
) -> anyhow::Result<()> {
    zip.start_file(entry, opts)
        .with_context(|| format!("failed to start entry {}", entry))?;
    let mut f = File::open(src)
        .with_context(|| format!("failed to open {}", src.to_string_lossy()))?;
    std::io::copy(&mut f, zip).with_context(|| format!("failed to write entry {}", entry))?;
    Ok(())
}

/// Restores a bundle into `workspace_path`. A bare SQLite file is accepted
/// and copied in as the database.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE);

    if !is_zip_file(in_path)? {
        std::fs::copy(in_path, &dst).with_context(|| {
            format!(
                "failed to copy sqlite file from {} to {}",
                in_path.to_string_lossy(),
                dst.to_string_lossy()
            )
        })?;
        return Ok(ImportSummary {
            bundle_format_detected: RAW_SQLITE_FORMAT.to_string(),
            restored_logs: Vec::new(),
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    extract_entry(&mut archive, DB_ENTRY, &dst)?;
    if archive.by_name(CONFIG_ENTRY).is_ok() {
        extract_entry(&mut archive, CONFIG_ENTRY, &workspace_path.join(CONFIG_FILE))?;
    }

    let log_entries: Vec<(String, PathBuf)> = (0..archive.len())
        .filter_map(|i| {
            let f = archive.by_index(i).ok()?;
            let rel = f.enclosed_name()?.strip_prefix(LOGS_PREFIX).ok()?.to_path_buf();
            if !is_workspace_relative(&rel.to_string_lossy()) {
                return None;
            }
            Some((f.name().to_string(), rel))
        })
        .collect();
    let mut restored_logs = Vec::new();
    for (entry, rel) in log_entries {
        extract_entry(&mut archive, &entry, &workspace_path.join(&rel))?;
        restored_logs.push(rel.to_string_lossy().to_string());
    }

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        restored_logs,
    })
}

/// Extracts through a temp file and renames over `dst`.
fn extract_entry(archive: &mut ZipArchive<File>, entry: &str, dst: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let mut tmp_name = dst.as_os_str().to_owned();
    tmp_name.push(".importing");
    let tmp = PathBuf::from(tmp_name);
    if tmp.exists() {
        let _ = std::fs::remove_file(&tmp);
    }

    let mut out = File::create(&tmp)
        .with_context(|| format!("failed to create temp file {}", tmp.to_string_lossy()))?;
    {
        let mut src = archive
            .by_name(entry)
            .with_context(|| format!("bundle missing {}", entry))?;
        std::io::copy(&mut src, &mut out).with_context(|| format!("failed to extract {}", entry))?;
    }
    out.flush().context("failed to flush extracted file")?;
    drop(out);

    if dst.exists() {
        std::fs::remove_file(dst)
            .with_context(|| format!("failed to remove existing {}", dst.to_string_lossy()))?;
    }
    std::fs::rename(&tmp, dst)
        .with_context(|| format!("failed to move extracted file to {}", dst.to_string_lossy()))?;
    Ok(())
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
