//! Shared test utilities for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use vk_photo_backup::api::{ApiError, ConversationApi};
use vk_photo_backup::models::HistoryPage;

/// A recorded `get_history_attachments` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub peer_id: u64,
    pub start_from: Option<String>,
    pub count: u32,
}

/// `ConversationApi` fake that replays scripted pages
pub struct ScriptedApi {
    user: Option<Value>,
    chat: Option<Value>,
    pages: Mutex<VecDeque<HistoryPage>>,
    /// When set, every call returns an empty page with a fresh cursor
    endless: bool,
    /// Delay before each page is answered
    delay: Option<Duration>,
    counter: AtomicUsize,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            user: None,
            chat: None,
            pages: Mutex::new(VecDeque::new()),
            endless: false,
            delay: None,
            counter: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns pages forever, each with a new cursor
    pub fn endless() -> Self {
        Self {
            endless: true,
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_user(mut self, user: Value) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_chat(mut self, chat: Value) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_page(self, items: Vec<Value>, next_from: Option<&str>) -> Self {
        self.pages.lock().unwrap().push_back(HistoryPage {
            items,
            next_from: next_from.map(str::to_string),
        });
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationApi for ScriptedApi {
    async fn get_user(&self, user_id: u64) -> Result<Value, ApiError> {
        self.user.clone().ok_or_else(|| ApiError::Vk {
            code: 113,
            message: format!("Invalid user id {}", user_id),
        })
    }

    async fn get_chat(&self, chat_id: u64) -> Result<Value, ApiError> {
        self.chat.clone().ok_or_else(|| ApiError::Vk {
            code: 100,
            message: format!("Invalid chat id {}", chat_id),
        })
    }

    async fn get_history_attachments(
        &self,
        peer_id: u64,
        start_from: Option<&str>,
        count: u32,
    ) -> Result<HistoryPage, ApiError> {
        self.requests.lock().unwrap().push(PageRequest {
            peer_id,
            start_from: start_from.map(str::to_string),
            count,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.endless {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            return Ok(HistoryPage {
                items: vec![json!({ "n": n })],
                next_from: Some(format!("cursor-{}", n)),
            });
        }

        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::MissingFieldError("items".to_string()))
    }
}

/// Attachment record in the legacy shape with `photo_<N>` keys
pub fn legacy_record(date: i64, sizes: &[(&str, &str)]) -> Value {
    let mut photo = json!({ "id": date, "owner_id": 1, "date": date });
    for (label, url) in sizes {
        photo[*label] = json!(url);
    }
    json!({
        "message_id": date,
        "attachment": { "type": "photo", "photo": photo }
    })
}

/// Attachment record in the current shape with a `sizes` array
pub fn sized_record(date: i64, sizes: &[(&str, &str)]) -> Value {
    let sizes: Vec<Value> = sizes
        .iter()
        .map(|(kind, url)| json!({ "type": kind, "url": url, "width": 100, "height": 100 }))
        .collect();
    json!({
        "message_id": date,
        "attachment": {
            "type": "photo",
            "photo": { "id": date, "owner_id": 1, "date": date, "sizes": sizes }
        }
    })
}
