//! ABOUTME: Utility functions for naming files and choosing photo variants
//! ABOUTME: Contains the name sanitizer, the high-resolution selector and filename derivation

use chrono::DateTime;
use log::{debug, warn};
use reqwest::Url;
use std::collections::HashMap;

/// Size-variant labels ordered from highest to lowest resolution.
///
/// The `photo_<N>` keys are what older API versions return directly on the
/// photo object. The single letters are the `type` values of the `sizes`
/// array returned by current API versions.
pub const PHOTO_SIZE_PRIORITY: &[&str] = &[
    "photo_2560",
    "photo_1280",
    "photo_807",
    "photo_604",
    "photo_130",
    "photo_75",
    "w",
    "z",
    "y",
    "x",
    "r",
    "q",
    "p",
    "o",
    "m",
    "s",
];

/// Characters that are replaced with `_` when building a directory name
pub const PROHIBITED_NAME_CHARS: &[char] = &[
    '/', '\\', '|', '?', '{', '}', '=', '%', '&', '*', '<', '>', '$', ':', '"',
];

/// Format used for every timestamp that ends up in a path
pub const PATH_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Replaces every prohibited character with an underscore
///
/// The replacement is one-for-one, so the output has exactly as many
/// characters as the input.
pub fn sanitize_name(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if PROHIBITED_NAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Selects the URL of the highest-resolution variant
///
/// Walks [`PHOTO_SIZE_PRIORITY`] and returns the URL of the first label that
/// is present in `sizes`. Labels not in the priority list are ignored.
///
/// # Arguments
///
/// * `sizes` - Map of size-variant label to URL
///
/// # Returns
///
/// The URL of the best variant, or `None` if no known label is present
pub fn select_high_res_url(sizes: &HashMap<String, String>) -> Option<&str> {
    let found = PHOTO_SIZE_PRIORITY
        .iter()
        .find_map(|label| sizes.get(*label).map(|url| (*label, url.as_str())));

    match found {
        Some((label, url)) => {
            debug!("Selected size variant '{}'", label);
            Some(url)
        }
        None => {
            debug!(
                "No known size variant among {} labels",
                sizes.len()
            );
            None
        }
    }
}

/// Formats a unix timestamp as `YYYYMMDD_HHMMSS` in UTC
///
/// Timestamps outside chrono's representable range fall back to the raw
/// number so that the filename stays deterministic.
pub fn format_timestamp(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.format(PATH_TIMESTAMP_FORMAT).to_string(),
        None => {
            warn!("Timestamp {} is out of range, using it verbatim", timestamp);
            timestamp.to_string()
        }
    }
}

/// Returns the last path segment of a URL, without query or fragment
///
/// Strings that do not parse as absolute URLs are split on `/` after the
/// query and fragment are cut off.
pub fn url_basename(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        return parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .unwrap_or_default();
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Derives the on-disk filename for a photo
///
/// The result is `<YYYYMMDD_HHMMSS>_<basename>`, where the basename is the
/// last path segment of the URL. A missing URL leaves the tail empty.
pub fn photo_filename(timestamp: i64, url: Option<&str>) -> String {
    let tail = url.map(url_basename).unwrap_or_default();
    format!("{}_{}", format_timestamp(timestamp), tail)
}
