//! Run configuration.
//!
//! [`BackupConfig`] gathers every tunable of a backup run. The binary fills
//! it from command-line flags and environment variables; library callers can
//! start from [`BackupConfig::default`].

use crate::retry::RetryConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Production endpoint for VK method calls
pub const DEFAULT_API_URL: &str = "https://api.vk.com";
/// Production endpoint for direct authorization
pub const DEFAULT_OAUTH_URL: &str = "https://oauth.vk.com";
pub const DEFAULT_API_VERSION: &str = "5.131";
/// Largest `count` accepted by `messages.getHistoryAttachments`
pub const MAX_PAGE_SIZE: u32 = 200;

/// Error type for invalid configuration values
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("page size must be between 1 and 200, got {0}")]
    PageSize(u32),
    #[error("max pages must be at least 1")]
    MaxPages,
    #[error("concurrency must be at least 1")]
    Concurrency,
    #[error("timeout must be greater than zero")]
    Timeout,
}

/// How the download phase schedules its work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// One download completes before the next begins
    Sequential,
    /// Up to `concurrency` downloads in flight at once
    Concurrent,
}

/// Configuration for a backup run
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Base URL for method calls, without trailing slash
    pub api_url: String,
    /// Base URL for authorization, without trailing slash
    pub oauth_url: String,
    /// Value sent as the `v` parameter
    pub api_version: String,
    /// Application credentials for direct authorization
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Directory in which the run root is created
    pub output_root: PathBuf,
    /// Items requested per attachment page
    pub page_size: u32,
    /// Safety cap on the number of attachment pages
    pub max_pages: usize,
    pub download_mode: DownloadMode,
    /// Simultaneous downloads in concurrent mode
    pub concurrency: usize,
    /// Per-request timeout, applied to API calls and downloads
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Retry policy for API calls
    pub api_retry: RetryConfig,
    /// Retry policy for photo downloads
    pub download_retry: RetryConfig,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            client_id: None,
            client_secret: None,
            output_root: PathBuf::from("."),
            page_size: MAX_PAGE_SIZE,
            max_pages: 10_000,
            download_mode: DownloadMode::Concurrent,
            concurrency: 4,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            api_retry: RetryConfig::default(),
            download_retry: RetryConfig::default(),
        }
    }
}

impl BackupConfig {
    /// Checks value ranges that would otherwise fail late in the run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::PageSize(self.page_size));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::MaxPages);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Concurrency);
        }
        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::Timeout);
        }
        Ok(())
    }

    /// Builds the shared HTTP client used by every request of the run
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
    }

    /// Number of simultaneous downloads the selected mode allows
    pub fn effective_concurrency(&self) -> usize {
        match self.download_mode {
            DownloadMode::Sequential => 1,
            DownloadMode::Concurrent => self.concurrency.max(1),
        }
    }
}
