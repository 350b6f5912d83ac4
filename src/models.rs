//! Data structures for VK API records and backup results.
//!
//! This module defines the typed shape of `messages.getHistoryAttachments`
//! items, the normalized photo descriptor built from them, and the values
//! that track each download and the run as a whole.

use crate::utils;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Helper module for deserializing timestamps that can be either strings or numbers
mod string_or_i64 {
    use log::trace;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(*value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StringOrNumberVisitor;

        impl Visitor<'_> for StringOrNumberVisitor {
            type Value = i64;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a unix timestamp as a string or number")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                i64::try_from(value)
                    .map_err(|_| E::custom(format!("timestamp {} does not fit in i64", value)))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                trace!("Timestamp delivered as string: '{}'", value);
                value
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| E::custom(format!("invalid timestamp '{}': {}", value, e)))
            }
        }

        deserializer.deserialize_any(StringOrNumberVisitor)
    }
}

/// One entry of the `sizes` array on a photo object
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PhotoSize {
    /// Size type letter (`s`, `m`, `x`, ..., `w`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Download URL of this variant
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Photo object nested inside an attachment
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RawPhoto {
    /// Capture/upload time as a unix timestamp
    #[serde(with = "string_or_i64")]
    pub date: i64,
    /// Size variants as returned by current API versions
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
    /// Everything else, including the legacy `photo_<N>` URL keys
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl RawPhoto {
    /// Collects every size variant into a single label-to-URL map
    ///
    /// Legacy `photo_<N>` string fields and `sizes` entries end up in the same
    /// map; the two never share labels.
    pub fn size_variants(&self) -> HashMap<String, String> {
        let mut variants: HashMap<String, String> = self
            .extra
            .iter()
            .filter(|(key, _)| key.starts_with("photo_"))
            .filter_map(|(key, value)| value.as_str().map(|url| (key.clone(), url.to_string())))
            .collect();

        for size in &self.sizes {
            variants.insert(size.kind.clone(), size.url.clone());
        }

        variants
    }
}

/// Attachment body: a type tag plus the matching media object
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub photo: RawPhoto,
}

/// One item of `messages.getHistoryAttachments`
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AttachmentRecord {
    /// Id of the message carrying the attachment
    #[serde(default)]
    pub message_id: Option<i64>,
    pub attachment: Attachment,
}

/// A page of `messages.getHistoryAttachments`
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    /// Raw attachment records in API order
    pub items: Vec<serde_json::Value>,
    /// Continuation cursor; `None` on the last page
    pub next_from: Option<String>,
}

/// Normalized photo: when it was taken and where to fetch it
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PhotoDescriptor {
    pub timestamp: i64,
    /// `None` when no known size variant was present
    pub url: Option<String>,
}

/// Reason a single download did not produce a file
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadFailure {
    #[error("no downloadable size variant")]
    MissingUrl,
    #[error("network error: {0}")]
    Network(String),
    #[error("server answered with status {0}")]
    HttpStatus(u16),
    #[error("filesystem error: {0}")]
    Io(String),
    #[error("cancelled before completion")]
    Cancelled,
}

/// Download state of a photo; leaves `Pending` exactly once
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    #[default]
    Pending,
    Downloaded {
        /// Number of bytes written to disk
        bytes: u64,
    },
    Failed(DownloadFailure),
}

/// A photo paired with its local filename and download state
#[derive(Debug, Clone)]
pub struct DownloadedPhoto {
    pub descriptor: PhotoDescriptor,
    pub filename: String,
    pub status: DownloadStatus,
}

impl DownloadedPhoto {
    /// Wraps a descriptor and derives its filename
    pub fn new(descriptor: PhotoDescriptor) -> Self {
        let filename = utils::photo_filename(descriptor.timestamp, descriptor.url.as_deref());
        Self {
            descriptor,
            filename,
            status: DownloadStatus::Pending,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self.status, DownloadStatus::Downloaded { .. })
    }

    pub fn failure(&self) -> Option<&DownloadFailure> {
        match &self.status {
            DownloadStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// An attachment record the parser could not use
#[derive(Debug, Clone)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: String,
}

/// Outcome of a complete backup run
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// Run root directory
    pub backup_dir: PathBuf,
    /// Number of raw records returned by the paginator
    pub records_fetched: usize,
    /// Records dropped by the parser
    pub skipped: Vec<SkippedRecord>,
    /// Every photo handed to the downloader, in API order
    pub photos: Vec<DownloadedPhoto>,
}

impl BackupReport {
    /// Number of photos handed to the downloader
    pub fn attempted(&self) -> usize {
        self.photos.len()
    }

    pub fn succeeded(&self) -> usize {
        self.photos.iter().filter(|p| p.is_downloaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.photos.iter().filter(|p| p.failure().is_some()).count()
    }

    /// True if any photo ended up cancelled
    pub fn was_cancelled(&self) -> bool {
        self.photos
            .iter()
            .any(|p| p.failure() == Some(&DownloadFailure::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_photo_serializes_date_as_number() {
        let photo: RawPhoto = serde_json::from_value(json!({
            "date": "1700000000",
            "photo_604": "https://cdn.example/604.jpg"
        }))
        .unwrap();
        assert_eq!(photo.date, 1_700_000_000);

        let value = serde_json::to_value(&photo).unwrap();
        assert_eq!(value["date"], json!(1_700_000_000));
        assert_eq!(value["photo_604"], "https://cdn.example/604.jpg");
    }
}
