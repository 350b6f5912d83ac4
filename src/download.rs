//! Photo downloader.
//!
//! Each photo is streamed into its own `.<filename>.<random>.part` file and
//! renamed into place only after the whole body arrived, so a failed
//! download never leaves a truncated file behind. Downloads run one at a time or concurrently with a
//! fixed number of permits, all sharing one `reqwest::Client`.

use crate::config::{BackupConfig, DownloadMode};
use crate::models::{DownloadFailure, DownloadStatus, DownloadedPhoto, PhotoDescriptor};
use crate::retry::{execute_with_retry, RetryConfig, Retryable};
use log::{debug, error, info, warn};
use reqwest::Client;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

impl Retryable for DownloadFailure {
    fn is_retryable(&self, config: &RetryConfig) -> bool {
        match self {
            DownloadFailure::Network(_) => true,
            DownloadFailure::HttpStatus(status) => config.should_retry_status(*status),
            DownloadFailure::MissingUrl | DownloadFailure::Io(_) | DownloadFailure::Cancelled => {
                false
            }
        }
    }
}

fn network_failure(err: reqwest::Error) -> DownloadFailure {
    DownloadFailure::Network(err.to_string())
}

fn io_failure(err: std::io::Error) -> DownloadFailure {
    DownloadFailure::Io(err.to_string())
}

/// Streams one URL into `dir/filename`
///
/// The body goes into a uniquely named `.part` file in the same directory,
/// which is renamed over the target once complete. Dropping the future
/// before that removes the partial file.
async fn fetch_to_file(
    client: &Client,
    url: &str,
    dir: &Path,
    filename: &str,
) -> Result<u64, DownloadFailure> {
    let mut resp = client.get(url).send().await.map_err(network_failure)?;

    let status = resp.status();
    if !status.is_success() {
        return Err(DownloadFailure::HttpStatus(status.as_u16()));
    }

    let part = tempfile::Builder::new()
        .prefix(&format!(".{}.", filename))
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(io_failure)?;
    let handle = part.as_file().try_clone().map_err(io_failure)?;
    let mut file = tokio::fs::File::from_std(handle);
    let mut written: u64 = 0;

    while let Some(chunk) = resp.chunk().await.map_err(network_failure)? {
        file.write_all(&chunk).await.map_err(io_failure)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_failure)?;
    drop(file);

    part.persist(dir.join(filename))
        .map_err(|e| io_failure(e.error))?;
    Ok(written)
}

/// Downloads a single photo into `dir`
///
/// The photo comes back with its status set to either `Downloaded` or
/// `Failed`. No error escapes this function: every failure is recorded on the
/// returned value and no partial file is left behind. Photos sharing a
/// filename each stream into their own partial file.
///
/// # Arguments
///
/// * `client` - Shared HTTP client (carries the request timeout)
/// * `photo` - Photo with `Pending` status
/// * `dir` - Target directory
/// * `retry` - Retry policy for transient failures
/// * `cancel` - Stops the download when triggered
pub async fn download_photo(
    client: &Client,
    mut photo: DownloadedPhoto,
    dir: &Path,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> DownloadedPhoto {
    debug_assert_eq!(photo.status, DownloadStatus::Pending);

    let url = match photo.descriptor.url.clone() {
        Some(url) => url,
        None => {
            warn!("No URL for photo taken at {}", photo.descriptor.timestamp);
            photo.status = DownloadStatus::Failed(DownloadFailure::MissingUrl);
            return photo;
        }
    };

    if cancel.is_cancelled() {
        photo.status = DownloadStatus::Failed(DownloadFailure::Cancelled);
        return photo;
    }

    debug!("Download photo from url: {}", url);

    let filename = photo.filename.clone();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DownloadFailure::Cancelled),
        result = execute_with_retry(&filename, retry, || fetch_to_file(client, &url, dir, &filename)) => result,
    };

    photo.status = match result {
        Ok(bytes) => {
            info!("Photo {} successfully downloaded ({} bytes)", photo.filename, bytes);
            DownloadStatus::Downloaded { bytes }
        }
        Err(failure) => {
            warn!("Problem with {} download: {}", photo.filename, failure);
            DownloadStatus::Failed(failure)
        }
    };
    photo
}

/// Runs `task` for every item with at most `limit` of them in flight
///
/// Results are returned in input order. A slot is `None` only if its task
/// panicked.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Vec<Option<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut join_set = JoinSet::new();
    let total = items.len();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let future = task(item);
        join_set.spawn(async move {
            // The semaphore is never closed, so acquiring cannot fail
            let _permit = semaphore.acquire_owned().await;
            (index, future.await)
        });
    }

    let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, value)) => results[index] = Some(value),
            Err(e) => error!("Download task did not complete: {}", e),
        }
    }
    results
}

/// Downloads every photo into `dir`
///
/// Sequential mode awaits each download before starting the next one;
/// concurrent mode keeps up to `config.concurrency` downloads in flight.
/// Every descriptor yields exactly one [`DownloadedPhoto`], in input order.
pub async fn download_all(
    client: &Client,
    photos: Vec<PhotoDescriptor>,
    dir: &Path,
    config: &BackupConfig,
    cancel: &CancellationToken,
) -> Vec<DownloadedPhoto> {
    let total = photos.len();
    info!(
        "Downloading {} photos ({:?}, {} at a time)",
        total,
        config.download_mode,
        config.effective_concurrency()
    );

    let pending: Vec<DownloadedPhoto> = photos.into_iter().map(DownloadedPhoto::new).collect();

    match config.download_mode {
        DownloadMode::Sequential => {
            let mut done = Vec::with_capacity(total);
            for photo in pending {
                done.push(download_photo(client, photo, dir, &config.download_retry, cancel).await);
            }
            done
        }
        DownloadMode::Concurrent => {
            let fallback = pending.clone();
            let dir = dir.to_path_buf();
            let results = run_bounded(pending, config.effective_concurrency(), |photo| {
                let client = client.clone();
                let dir = dir.clone();
                let retry = config.download_retry.clone();
                let cancel = cancel.clone();
                async move { download_photo(&client, photo, &dir, &retry, &cancel).await }
            })
            .await;

            results
                .into_iter()
                .zip(fallback)
                .map(|(result, mut original)| {
                    result.unwrap_or_else(|| {
                        original.status = DownloadStatus::Failed(DownloadFailure::Io(
                            "download task aborted".to_string(),
                        ));
                        original
                    })
                })
                .collect()
        }
    }
}
