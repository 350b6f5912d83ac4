//! Command-line frontend for the vk-dialog-photo-backup library.
//! See the lib.rs file for the actual functionality.

use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{error, info, warn};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vk_photo_backup::api::VkApi;
use vk_photo_backup::auth::{self, Credentials};
use vk_photo_backup::config::{BackupConfig, DownloadMode, DEFAULT_API_VERSION, MAX_PAGE_SIZE};
use vk_photo_backup::models::BackupReport;
use vk_photo_backup::target::ConversationTarget;

const EXIT_AUTH_FAILURE: u8 = 1;
const EXIT_FATAL: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "vk-dialog-photo-backup")]
#[command(version)]
#[command(about = "VK dialog photo dumper", long_about = None)]
struct Cli {
    /// VK user id, or chat id prefixed with 'c' (e.g. 12345 or c67)
    #[arg(short, long)]
    id: ConversationTarget,

    /// Directory in which the backup folder is created
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Number of photos downloaded at the same time
    #[arg(short, long, env = "VK_BACKUP_JOBS", default_value_t = 4)]
    jobs: usize,

    /// Download one photo at a time
    #[arg(long)]
    sequential: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Retries for a failed photo download
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Stop with an error after this many attachment pages
    #[arg(long, default_value_t = 10_000)]
    max_pages: usize,

    /// Attachments requested per page
    #[arg(long, default_value_t = MAX_PAGE_SIZE, value_parser = clap::value_parser!(u32).range(1..=200))]
    page_size: u32,

    /// VK API version
    #[arg(long, default_value = DEFAULT_API_VERSION)]
    api_version: String,

    /// Access token; skips the login prompt
    #[arg(long, env = "VK_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Application id for login/password authorization
    #[arg(long, env = "VK_CLIENT_ID")]
    client_id: Option<String>,

    /// Application secret for login/password authorization
    #[arg(long, env = "VK_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
}

impl Cli {
    fn to_config(&self) -> BackupConfig {
        let mut config = BackupConfig {
            api_version: self.api_version.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            output_root: self.output.clone(),
            page_size: self.page_size,
            max_pages: self.max_pages,
            download_mode: if self.sequential {
                DownloadMode::Sequential
            } else {
                DownloadMode::Concurrent
            },
            concurrency: self.jobs,
            request_timeout: Duration::from_secs(self.timeout),
            ..BackupConfig::default()
        };
        config.download_retry.max_retries = self.retries;
        config
    }
}

/// Reads a line without echoing it to the terminal
fn read_masked(prompt: &str) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    terminal::enable_raw_mode()?;
    let result = read_masked_raw();
    terminal::disable_raw_mode()?;
    println!();
    result
}

fn read_masked_raw() -> io::Result<String> {
    let mut secret = String::new();
    loop {
        if let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        {
            match code {
                KeyCode::Enter => return Ok(secret),
                KeyCode::Backspace => {
                    secret.pop();
                }
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "input cancelled"));
                }
                KeyCode::Char(c) => secret.push(c),
                _ => {}
            }
        }
    }
}

fn prompt_credentials() -> io::Result<Credentials> {
    print!("Login: ");
    io::stdout().flush()?;
    let mut login = String::new();
    io::stdin().lock().read_line(&mut login)?;

    let password = read_masked("Password: ")?;
    Ok(Credentials::Password {
        login: login.trim().to_string(),
        password,
    })
}

fn print_summary(report: &BackupReport) {
    for photo in &report.photos {
        if let Some(failure) = photo.failure() {
            warn!("{}: {}", photo.filename, failure);
        }
    }
    for skipped in &report.skipped {
        warn!("Record {} skipped: {}", skipped.index, skipped.reason);
    }

    println!(
        "{} of {} photos were downloaded ({} failed, {} records skipped)",
        report.succeeded(),
        report.attempted(),
        report.failed(),
        report.skipped.len()
    );
    println!("Backup saved to {}", report.backup_dir.display());
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.to_config();
    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::from(EXIT_FATAL);
    }

    let client = match config.http_client() {
        Ok(client) => client,
        Err(e) => {
            error!("Could not create HTTP client: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let credentials = match &cli.token {
        Some(token) => Credentials::Token(token.clone()),
        None => match prompt_credentials() {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("Could not read credentials: {}", e);
                return ExitCode::from(EXIT_AUTH_FAILURE);
            }
        },
    };

    info!("VK authorization");
    let access_token = match auth::authorize(&client, &credentials, &config).await {
        Ok(token) => token,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_AUTH_FAILURE);
        }
    };
    info!("Success");

    let api = VkApi::new(client.clone(), access_token, &config);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding downloads");
            interrupt.cancel();
        }
    });

    match vk_photo_backup::run_backup(&api, &client, cli.id, &config, &cancel).await {
        Ok(report) => {
            print_summary(&report);
            if report.was_cancelled() {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(vk_photo_backup::BackupError::Cancelled) => {
            warn!("Backup cancelled");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            error!("Backup failed: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
