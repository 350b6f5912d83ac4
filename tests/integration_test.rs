mod common;

use common::{legacy_record, sized_record, ScriptedApi};
use serde_json::{json, Value};
use std::fs;
use tokio_util::sync::CancellationToken;
use vk_photo_backup::config::{BackupConfig, DownloadMode};
use vk_photo_backup::models::DownloadFailure;
use vk_photo_backup::retry::RetryConfig;
use vk_photo_backup::target::ConversationTarget;
use vk_photo_backup::{run_backup, BackupError};

fn config_for(root: &std::path::Path, mode: DownloadMode) -> BackupConfig {
    BackupConfig {
        output_root: root.to_path_buf(),
        download_mode: mode,
        download_retry: RetryConfig::none(),
        ..BackupConfig::default()
    }
}

#[tokio::test]
async fn test_backup_of_user_dialog() {
    let mut server = mockito::Server::new_async().await;
    let _photo_a = server
        .mock("GET", "/impg/a.jpg")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("first photo")
        .create_async()
        .await;
    let _photo_b = server
        .mock("GET", "/impg/b.jpg")
        .with_status(404)
        .create_async()
        .await;
    let host = server.url();

    let profile = json!({ "id": 12345, "first_name": "Иван", "last_name": "Pe/trov" });
    let api = ScriptedApi::new()
        .with_user(profile.clone())
        .with_page(
            vec![
                legacy_record(
                    1_700_000_000,
                    &[
                        ("photo_130", "https://cdn.example/small.jpg"),
                        ("photo_1280", format!("{}/impg/a.jpg?size=1280", host).as_str()),
                    ],
                ),
                json!({ "message_id": 2 }),
            ],
            Some("next"),
        )
        .with_page(
            vec![
                sized_record(1_700_000_100, &[("z", format!("{}/impg/b.jpg", host).as_str())]),
                legacy_record(1_700_000_200, &[("thumb", "https://cdn.example/t.jpg")]),
            ],
            None,
        );

    let root = tempfile::tempdir().unwrap();
    let report = run_backup(
        &api,
        &reqwest::Client::new(),
        ConversationTarget::User(12345),
        &config_for(root.path(), DownloadMode::Concurrent),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    // Counts: four records, one malformed, three attempted, one succeeded
    assert_eq!(report.records_fetched, 4);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].index, 1);
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.photos[1].failure(), Some(&DownloadFailure::HttpStatus(404)));
    assert_eq!(report.photos[2].failure(), Some(&DownloadFailure::MissingUrl));

    // Layout: <root>/<YYYYMMDD_HHMMSS>_<name>/{dest_data.json, photo/}
    let dir_name = report.backup_dir.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(report.backup_dir.parent().unwrap(), root.path());
    assert!(dir_name.ends_with("_Иван_Pe_trov"), "dir name: {}", dir_name);
    assert_eq!(dir_name.find('_'), Some(8));

    let metadata: Value =
        serde_json::from_str(&fs::read_to_string(report.backup_dir.join("dest_data.json")).unwrap())
            .unwrap();
    assert_eq!(metadata, profile);

    let photo_dir = report.backup_dir.join("photo");
    let files: Vec<String> = fs::read_dir(&photo_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, vec!["20231114_221320_a.jpg"]);
    assert_eq!(
        fs::read_to_string(photo_dir.join("20231114_221320_a.jpg")).unwrap(),
        "first photo"
    );

    // Direct dialogs are queried with the user id as peer id
    assert!(api.requests().iter().all(|r| r.peer_id == 12345));
}

#[tokio::test]
async fn test_backup_of_chat_uses_offset_peer_id() {
    let api = ScriptedApi::new()
        .with_chat(json!({ "id": 67, "title": "Trip 2023: day 1" }))
        .with_page(vec![], None);

    let root = tempfile::tempdir().unwrap();
    let report = run_backup(
        &api,
        &reqwest::Client::new(),
        "c67".parse().unwrap(),
        &config_for(root.path(), DownloadMode::Sequential),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(api.requests()[0].peer_id, 2_000_000_067);
    assert_eq!(report.attempted(), 0);

    let dir_name = report.backup_dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(dir_name.ends_with("_chat_Trip 2023_ day 1"), "dir name: {}", dir_name);
    assert!(report.backup_dir.join("photo").is_dir());
}

#[tokio::test]
async fn test_failed_lookup_creates_nothing() {
    let api = ScriptedApi::new();
    let root = tempfile::tempdir().unwrap();

    let result = run_backup(
        &api,
        &reqwest::Client::new(),
        ConversationTarget::User(1),
        &config_for(root.path(), DownloadMode::Concurrent),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(BackupError::Resolve { .. })));
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_pagination_failure_aborts_run() {
    let api = ScriptedApi::endless().with_user(json!({ "first_name": "A", "last_name": "B" }));
    let root = tempfile::tempdir().unwrap();
    let config = BackupConfig {
        max_pages: 3,
        ..config_for(root.path(), DownloadMode::Concurrent)
    };

    let result = run_backup(
        &api,
        &reqwest::Client::new(),
        ConversationTarget::User(1),
        &config,
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(BackupError::Pagination(_))));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let api = ScriptedApi::new().with_user(json!({}));
    let root = tempfile::tempdir().unwrap();
    let config = BackupConfig {
        concurrency: 0,
        ..config_for(root.path(), DownloadMode::Concurrent)
    };

    let result = run_backup(
        &api,
        &reqwest::Client::new(),
        ConversationTarget::User(1),
        &config,
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(BackupError::Config(_))));
}

#[tokio::test]
async fn test_cancelled_run_stops_before_paging() {
    let api = ScriptedApi::endless().with_user(json!({ "first_name": "A", "last_name": "B" }));
    let root = tempfile::tempdir().unwrap();
    let config = BackupConfig {
        max_pages: 500,
        ..config_for(root.path(), DownloadMode::Concurrent)
    };
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = run_backup(
        &api,
        &reqwest::Client::new(),
        ConversationTarget::User(1),
        &config,
        &cancel,
    )
    .await;

    assert!(matches!(result, Err(BackupError::Cancelled)));
    assert!(api.requests().is_empty());
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_long_chat_title_is_shortened() {
    let title = "Очень длинное название беседы ".repeat(20);
    let api = ScriptedApi::new()
        .with_chat(json!({ "id": 5, "title": title }))
        .with_page(vec![], None);
    let root = tempfile::tempdir().unwrap();

    let report = run_backup(
        &api,
        &reqwest::Client::new(),
        ConversationTarget::Chat(5),
        &config_for(root.path(), DownloadMode::Sequential),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let dir_name = report.backup_dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(dir_name.len() <= 255, "dir name is {} bytes", dir_name.len());
    assert!(dir_name.contains("_chat_Очень"));
    assert!(report.backup_dir.join("dest_data.json").is_file());
}
