//! Authorization against the VK OAuth endpoint.
//!
//! A run needs an access token. It is either supplied directly or obtained
//! through VK's direct authorization flow (`grant_type=password`), which
//! requires the application's client id and secret.

use crate::config::BackupConfig;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

/// Error type for authorization
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Client id and secret are required for login/password authorization (set VK_CLIENT_ID and VK_CLIENT_SECRET)")]
    MissingClientCredentials,
    #[error("Empty login or password")]
    EmptyCredentials,
    #[error("Authorization rejected: {error}: {description}")]
    Rejected { error: String, description: String },
    #[error("Authorization response did not contain an access token")]
    MissingToken,
    #[error("Authorization request failed: {0}")]
    Network(#[from] reqwest::Error),
}

/// What the user supplied to log in
#[derive(Clone)]
pub enum Credentials {
    /// A pre-issued access token
    Token(String),
    /// Account login and password
    Password { login: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Credentials::Token(..)"),
            Credentials::Password { login, .. } => f
                .debug_struct("Credentials::Password")
                .field("login", login)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    user_id: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Obtains an access token for the run
///
/// # Arguments
///
/// * `client` - Shared HTTP client
/// * `credentials` - Token or login/password pair
/// * `config` - Supplies the OAuth URL, API version and client credentials
///
/// # Returns
///
/// The access token to use for every method call
pub async fn authorize(
    client: &Client,
    credentials: &Credentials,
    config: &BackupConfig,
) -> Result<String, AuthError> {
    let (login, password) = match credentials {
        Credentials::Token(token) if token.trim().is_empty() => {
            return Err(AuthError::EmptyCredentials)
        }
        Credentials::Token(token) => {
            debug!("Using supplied access token");
            return Ok(token.trim().to_string());
        }
        Credentials::Password { login, password } => (login, password),
    };

    if login.is_empty() || password.is_empty() {
        return Err(AuthError::EmptyCredentials);
    }

    let (client_id, client_secret) = match (&config.client_id, &config.client_secret) {
        (Some(id), Some(secret)) => (id, secret),
        _ => return Err(AuthError::MissingClientCredentials),
    };

    info!("Authorization attempt for {}", login);

    let url = format!("{}/token", config.oauth_url.trim_end_matches('/'));
    let params = [
        ("grant_type", "password"),
        ("client_id", client_id.as_str()),
        ("client_secret", client_secret.as_str()),
        ("username", login.as_str()),
        ("password", password.as_str()),
        ("v", config.api_version.as_str()),
        ("2fa_supported", "1"),
    ];

    // Rejections come back as 401 with a JSON body, so the status is not checked
    let resp = client.post(&url).form(&params).send().await?;
    let status = resp.status();
    let body: TokenResponse = resp.json().await?;

    if let Some(error) = body.error {
        return Err(AuthError::Rejected {
            error,
            description: body.error_description.unwrap_or_default(),
        });
    }

    match body.access_token {
        Some(token) if !token.is_empty() => {
            info!(
                "Authorized{}",
                body.user_id
                    .map(|id| format!(" as user {}", id))
                    .unwrap_or_default()
            );
            Ok(token)
        }
        _ => {
            debug!("Token endpoint answered {} without a token", status);
            Err(AuthError::MissingToken)
        }
    }
}
