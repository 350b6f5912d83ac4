//! Attachment parser.
//!
//! Turns raw attachment records into [`PhotoDescriptor`]s. A record that
//! does not have the expected shape is skipped and reported with its index;
//! the remaining records are still parsed.

use crate::models::{AttachmentRecord, PhotoDescriptor, SkippedRecord};
use crate::utils;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

/// A record that could not be turned into a photo descriptor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("attachment record {index} is malformed: {reason}")]
pub struct ParseError {
    /// Position of the record in the paginator output
    pub index: usize,
    pub reason: String,
}

/// Result of parsing a batch of records
#[derive(Debug, Clone, Default)]
pub struct ParsedAttachments {
    pub photos: Vec<PhotoDescriptor>,
    pub skipped: Vec<SkippedRecord>,
}

/// Parses a single raw record
///
/// # Arguments
///
/// * `index` - Position of the record, used in the error
/// * `record` - Raw JSON item from the paginator
pub fn parse_attachment(index: usize, record: &Value) -> Result<PhotoDescriptor, ParseError> {
    let parsed = AttachmentRecord::deserialize(record).map_err(|e| ParseError {
        index,
        reason: e.to_string(),
    })?;

    if parsed.attachment.kind != "photo" {
        return Err(ParseError {
            index,
            reason: format!("unexpected attachment type '{}'", parsed.attachment.kind),
        });
    }

    let variants = parsed.attachment.photo.size_variants();
    let url = utils::select_high_res_url(&variants).map(str::to_string);
    if url.is_none() {
        warn!(
            "Attachment record {} has no known size variant ({} labels)",
            index,
            variants.len()
        );
    }

    Ok(PhotoDescriptor {
        timestamp: parsed.attachment.photo.date,
        url,
    })
}

/// Parses every record, collecting failures instead of stopping
pub fn parse_attachments(records: &[Value]) -> ParsedAttachments {
    let mut result = ParsedAttachments {
        photos: Vec::with_capacity(records.len()),
        skipped: Vec::new(),
    };

    for (index, record) in records.iter().enumerate() {
        match parse_attachment(index, record) {
            Ok(photo) => result.photos.push(photo),
            Err(e) => {
                warn!("Skipping record: {}", e);
                result.skipped.push(SkippedRecord {
                    index: e.index,
                    reason: e.reason,
                });
            }
        }
    }

    debug!(
        "Parsed {} photos, skipped {} records",
        result.photos.len(),
        result.skipped.len()
    );
    result
}
