//! API client for the VK methods used by a backup.
//!
//! This module provides the [`ConversationApi`] seam the orchestrator and the
//! paginator talk to, and [`VkApi`], its implementation over HTTP. Every
//! method call goes through [`VkApi::call`], which unwraps VK's
//! `response`/`error` envelope and retries transient failures.

use crate::config::BackupConfig;
use crate::models::HistoryPage;
use crate::retry::{execute_with_retry, RetryConfig, Retryable};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;

/// VK error code for "too many requests per second"
pub const VK_TOO_MANY_REQUESTS: i64 = 6;
/// VK error code for "internal server error"
pub const VK_INTERNAL_ERROR: i64 = 10;

/// Custom error type for API-related errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Error from a network request
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    /// Error when a request fails with a status code
    #[error("Request error (status {status}): {message}")]
    RequestError { status: u16, message: String },
    /// Error object returned by the API itself
    #[error("VK error {code}: {message}")]
    Vk { code: i64, message: String },
    /// Error when parsing JSON
    #[error("JSON parse error: {0}")]
    JsonParseError(String),
    /// Error when a field is missing in the response
    #[error("Missing field in response: {0}")]
    MissingFieldError(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::JsonParseError(err.to_string())
    }
}

impl Retryable for ApiError {
    fn is_retryable(&self, config: &RetryConfig) -> bool {
        match self {
            ApiError::NetworkError(e) => !e.is_builder(),
            ApiError::RequestError { status, .. } => config.should_retry_status(*status),
            ApiError::Vk { code, .. } => matches!(*code, VK_TOO_MANY_REQUESTS | VK_INTERNAL_ERROR),
            ApiError::JsonParseError(_) | ApiError::MissingFieldError(_) => false,
        }
    }
}

/// The remote operations a backup needs
///
/// Implemented by [`VkApi`] for real runs and by scripted fakes in tests.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Raw profile of a user (`users.get`)
    async fn get_user(&self, user_id: u64) -> Result<Value, ApiError>;

    /// Raw chat metadata (`messages.getChat`)
    async fn get_chat(&self, chat_id: u64) -> Result<Value, ApiError>;

    /// One page of photo attachments (`messages.getHistoryAttachments`)
    async fn get_history_attachments(
        &self,
        peer_id: u64,
        start_from: Option<&str>,
        count: u32,
    ) -> Result<HistoryPage, ApiError>;
}

/// Authenticated VK API session
#[derive(Debug, Clone)]
pub struct VkApi {
    client: Client,
    base_url: String,
    access_token: String,
    version: String,
    retry: RetryConfig,
}

impl VkApi {
    /// Creates a session from an access token and the run configuration
    pub fn new(client: Client, access_token: impl Into<String>, config: &BackupConfig) -> Self {
        Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            version: config.api_version.clone(),
            retry: config.api_retry.clone(),
        }
    }

    /// Calls a VK method and returns the content of its `response` field
    ///
    /// # Arguments
    ///
    /// * `method` - Method name, e.g. `users.get`
    /// * `params` - Method parameters; the token and version are added here
    pub async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = format!("{}/method/{}", self.base_url, method);

        let mut form: Vec<(&str, String)> = params.to_vec();
        form.push(("access_token", self.access_token.clone()));
        form.push(("v", self.version.clone()));

        debug!("Calling {} with {} parameters", method, params.len());

        execute_with_retry(method, &self.retry, || async {
            let resp = self.client.post(&url).form(&form).send().await?;

            if !resp.status().is_success() {
                return Err(ApiError::RequestError {
                    status: resp.status().as_u16(),
                    message: format!("{} request failed", method),
                });
            }

            let data: Value = resp.json().await?;
            unwrap_envelope(data)
        })
        .await
    }
}

/// Extracts `response` from a method reply or converts `error` into [`ApiError::Vk`]
fn unwrap_envelope(mut data: Value) -> Result<Value, ApiError> {
    if let Some(error) = data.get("error") {
        let code = error.get("error_code").and_then(Value::as_i64).unwrap_or(-1);
        let message = error
            .get("error_msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(ApiError::Vk { code, message });
    }

    match data.get_mut("response") {
        Some(response) => Ok(response.take()),
        None => Err(ApiError::MissingFieldError("response".to_string())),
    }
}

/// Turns a `messages.getHistoryAttachments` response into a [`HistoryPage`]
///
/// A cursor that is absent, null, empty or not a string ends pagination.
pub fn parse_history_page(mut response: Value) -> Result<HistoryPage, ApiError> {
    let items = match response.get_mut("items").map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ApiError::JsonParseError(
                "'items' field is not an array".to_string(),
            ))
        }
        None => return Err(ApiError::MissingFieldError("items".to_string())),
    };

    let next_from = match response.get("next_from") {
        None | Some(Value::Null) => None,
        Some(Value::String(cursor)) if cursor.is_empty() => None,
        Some(Value::String(cursor)) => Some(cursor.clone()),
        Some(other) => {
            warn!("Ignoring non-string 'next_from' cursor: {}", other);
            None
        }
    };

    Ok(HistoryPage { items, next_from })
}

#[async_trait]
impl ConversationApi for VkApi {
    async fn get_user(&self, user_id: u64) -> Result<Value, ApiError> {
        let response = self
            .call("users.get", &[("user_ids", user_id.to_string())])
            .await?;

        match response {
            Value::Array(mut users) if !users.is_empty() => Ok(users.swap_remove(0)),
            Value::Array(_) => Err(ApiError::MissingFieldError(format!(
                "users.get returned no profile for {}",
                user_id
            ))),
            _ => Err(ApiError::JsonParseError(
                "users.get response is not an array".to_string(),
            )),
        }
    }

    async fn get_chat(&self, chat_id: u64) -> Result<Value, ApiError> {
        let response = self
            .call("messages.getChat", &[("chat_id", chat_id.to_string())])
            .await?;

        if !response.is_object() {
            return Err(ApiError::JsonParseError(
                "messages.getChat response is not an object".to_string(),
            ));
        }
        Ok(response)
    }

    async fn get_history_attachments(
        &self,
        peer_id: u64,
        start_from: Option<&str>,
        count: u32,
    ) -> Result<HistoryPage, ApiError> {
        let mut params = vec![
            ("peer_id", peer_id.to_string()),
            ("media_type", "photo".to_string()),
            ("count", count.to_string()),
        ];
        if let Some(cursor) = start_from {
            params.push(("start_from", cursor.to_string()));
        }

        let response = self.call("messages.getHistoryAttachments", &params).await?;
        parse_history_page(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope() {
        let value = unwrap_envelope(json!({ "response": { "id": 1 } })).unwrap();
        assert_eq!(value, json!({ "id": 1 }));

        match unwrap_envelope(json!({ "error": { "error_code": 5, "error_msg": "auth failed" } })) {
            Err(ApiError::Vk { code, message }) => {
                assert_eq!(code, 5);
                assert_eq!(message, "auth failed");
            }
            other => panic!("Expected Vk error, got {:?}", other),
        }

        assert!(matches!(
            unwrap_envelope(json!({ "something": 1 })),
            Err(ApiError::MissingFieldError(_))
        ));
    }

    #[test]
    fn test_parse_history_page_cursor_handling() {
        let page = parse_history_page(json!({ "items": [1, 2], "next_from": "abc" })).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_from.as_deref(), Some("abc"));

        let page = parse_history_page(json!({ "items": [], "next_from": "" })).unwrap();
        assert_eq!(page.next_from, None);

        let page = parse_history_page(json!({ "items": [], "next_from": 42 })).unwrap();
        assert_eq!(page.next_from, None);

        let page = parse_history_page(json!({ "items": [1] })).unwrap();
        assert_eq!(page.next_from, None);

        assert!(matches!(
            parse_history_page(json!({ "next_from": "x" })),
            Err(ApiError::MissingFieldError(_))
        ));
        assert!(matches!(
            parse_history_page(json!({ "items": {} })),
            Err(ApiError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_retryable_classification() {
        let config = RetryConfig::default();
        assert!(ApiError::Vk { code: 6, message: String::new() }.is_retryable(&config));
        assert!(ApiError::Vk { code: 10, message: String::new() }.is_retryable(&config));
        assert!(!ApiError::Vk { code: 5, message: String::new() }.is_retryable(&config));
        assert!(ApiError::RequestError { status: 502, message: String::new() }.is_retryable(&config));
        assert!(!ApiError::RequestError { status: 404, message: String::new() }.is_retryable(&config));
        assert!(!ApiError::MissingFieldError("items".into()).is_retryable(&config));
    }
}
