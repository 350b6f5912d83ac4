//! Backup directory layout.
//!
//! A run writes into `<root>/<YYYYMMDD_HHMMSS>_<name>/`, which holds
//! `dest_data.json` and the `photo/` subdirectory.

use crate::utils;
use chrono::{DateTime, TimeZone};
use log::info;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

/// File holding the raw profile or chat metadata
pub const METADATA_FILE: &str = "dest_data.json";
/// Subdirectory holding the downloaded photos
pub const PHOTO_DIR: &str = "photo";
/// Longest display name, in bytes, kept in the run root name
pub const MAX_NAME_BYTES: usize = 200;

/// Display name of a direct dialog: `<first>_<last>`
pub fn user_display_name(profile: &Value) -> String {
    let first = profile.get("first_name").and_then(Value::as_str).unwrap_or("");
    let last = profile.get("last_name").and_then(Value::as_str).unwrap_or("");
    format!("{}_{}", first, last)
}

/// Display name of a group chat: `chat_<title>`
pub fn chat_display_name(chat: &Value) -> String {
    let title = chat.get("title").and_then(Value::as_str).unwrap_or("");
    format!("chat_{}", title)
}

/// Cuts `name` to at most `max_bytes` bytes on a character boundary
fn truncate_to_bytes(name: &str, max_bytes: usize) -> &str {
    if name.len() <= max_bytes {
        return name;
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Name of the run root for a given start time and display name
///
/// The sanitized name is capped at [`MAX_NAME_BYTES`] so the result stays
/// within common filesystem name limits.
pub fn backup_dir_name<Tz>(started_at: &DateTime<Tz>, display_name: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let sanitized = utils::sanitize_name(display_name);
    format!(
        "{}_{}",
        started_at.format(utils::PATH_TIMESTAMP_FORMAT),
        truncate_to_bytes(&sanitized, MAX_NAME_BYTES)
    )
}

/// Creates the run root under `root`
///
/// The directory itself must not exist yet; missing parents are created.
pub async fn create_backup_dir(root: &Path, name: &str) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(root).await?;
    let path = root.join(name);
    tokio::fs::create_dir(&path).await?;
    info!("Created backup directory {}", path.display());
    Ok(path)
}

/// Serializes `value` with four-space indentation, keeping non-ASCII text as is
pub fn to_indented_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Writes the target's raw metadata to `dest_data.json`
pub async fn write_metadata(backup_dir: &Path, metadata: &Value) -> Result<PathBuf, crate::BackupError> {
    let path = backup_dir.join(METADATA_FILE);
    let bytes = to_indented_json(metadata)?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| crate::BackupError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Creates the `photo/` subdirectory
pub async fn create_photo_dir(backup_dir: &Path) -> io::Result<PathBuf> {
    let path = backup_dir.join(PHOTO_DIR);
    tokio::fs::create_dir(&path).await?;
    Ok(path)
}
