//! A Rust library for backing up the photos of a VK conversation.
//!
//! This library fetches every photo attachment of a direct dialog or group
//! chat, picks the highest-resolution variant of each one, and downloads them
//! into a per-run folder next to a JSON dump of the conversation metadata.
//!
//! # Logging
//!
//! This library uses the [`log`] crate for logging. You can enable logging by
//! initializing a logger in your application, such as [`env_logger`]. Set the
//! RUST_LOG environment variable to control log levels (e.g., `RUST_LOG=info`).
//!
//! ```
//! // Initialize the logger in your application
//! env_logger::init();
//! ```
//!
//! Per-photo problems (malformed records, failed downloads) are logged as
//! warnings and collected in the [`models::BackupReport`]; only problems that
//! stop the whole run are returned as errors.

/// Module containing data model structures
pub mod models;

/// Module parsing the conversation id given by the user
pub mod target;

/// Module with retry and backoff helpers
pub mod retry;

/// Module holding the run configuration
pub mod config;

/// Module for VK method calls
pub mod api;

/// Module obtaining an access token
pub mod auth;

/// Module walking the attachment history
pub mod paginate;

/// Module turning raw records into photo descriptors
pub mod parse;

/// Module downloading photos to disk
pub mod download;

/// Module handling the backup directory layout
pub mod backup;

/// Module containing naming and selection helpers
pub mod utils;

use crate::api::{ApiError, ConversationApi};
use crate::config::{BackupConfig, ConfigError};
use crate::models::BackupReport;
use crate::paginate::PaginationError;
use crate::target::ConversationTarget;
use chrono::Local;
use log::info;
use reqwest::Client;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Errors that abort a backup run
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Could not look up {target}: {source}")]
    Resolve {
        target: ConversationTarget,
        #[source]
        source: ApiError,
    },
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error("Filesystem error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not serialize metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Backup cancelled")]
    Cancelled,
}

/// Main entry point for backing up a conversation
///
/// This function orchestrates the entire process of:
/// 1. Looking up the user profile or chat metadata
/// 2. Creating `<YYYYMMDD_HHMMSS>_<name>/` under the configured root
/// 3. Writing the metadata to `dest_data.json`
/// 4. Fetching every photo attachment of the conversation
/// 5. Parsing the records into photo descriptors
/// 6. Downloading each photo into `photo/`
///
/// # Arguments
///
/// * `api` - Authenticated API session
/// * `client` - HTTP client used for the photo downloads
/// * `target` - Conversation to back up
/// * `config` - Run configuration
/// * `cancel` - Token that stops the lookup, the pagination and outstanding downloads
///
/// # Returns
///
/// A report listing every photo and whether it was downloaded
pub async fn run_backup(
    api: &dyn ConversationApi,
    client: &Client,
    target: ConversationTarget,
    config: &BackupConfig,
    cancel: &CancellationToken,
) -> Result<BackupReport, BackupError> {
    config.validate()?;
    let started_at = Local::now();

    info!("Backup prepare for {}", target);
    let lookup = async {
        match target {
            ConversationTarget::User(id) => api.get_user(id).await,
            ConversationTarget::Chat(id) => api.get_chat(id).await,
        }
    };
    let resolved = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(BackupError::Cancelled),
        resolved = lookup => resolved,
    };
    let metadata = resolved.map_err(|source| BackupError::Resolve { target, source })?;
    let display_name = if target.is_chat() {
        backup::chat_display_name(&metadata)
    } else {
        backup::user_display_name(&metadata)
    };

    let dir_name = backup::backup_dir_name(&started_at, &display_name);
    let backup_dir = backup::create_backup_dir(&config.output_root, &dir_name)
        .await
        .map_err(|source| BackupError::Io {
            path: config.output_root.join(&dir_name),
            source,
        })?;

    backup::write_metadata(&backup_dir, &metadata).await?;

    info!("Photo prepare");
    let photo_dir = backup::create_photo_dir(&backup_dir)
        .await
        .map_err(|source| BackupError::Io {
            path: backup_dir.join(backup::PHOTO_DIR),
            source,
        })?;

    info!("Backup photos");
    let records = paginate::fetch_all_attachments(api, target.peer_id(), config, cancel)
        .await
        .map_err(|e| match e {
            PaginationError::Cancelled { .. } => BackupError::Cancelled,
            e => BackupError::Pagination(e),
        })?;

    let parsed = parse::parse_attachments(&records);

    info!("Download photos");
    let photos = download::download_all(client, parsed.photos, &photo_dir, config, cancel).await;

    Ok(BackupReport {
        backup_dir,
        records_fetched: records.len(),
        skipped: parsed.skipped,
        photos,
    })
}
