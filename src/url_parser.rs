//! Extract Drive and Sheets ids from share URLs.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, WorkspaceError};

/// Regex patterns for Google Drive and Docs URLs.
static FOLDER_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)")
        .expect("Invalid folder URL regex")
});

static FILE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/file/d/([a-zA-Z0-9_-]+)")
        .expect("Invalid file URL regex")
});

static OPEN_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/open\?id=([a-zA-Z0-9_-]+)")
        .expect("Invalid open URL regex")
});

static DOCS_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://docs\.google\.com/(?:spreadsheets|document|presentation)/(?:u/\d+/)?d/([a-zA-Z0-9_-]+)")
        .expect("Invalid docs URL regex")
});

/// Valid Google Drive ID pattern (alphanumeric, underscore, hyphen).
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// Extract a Drive or Sheets id from a URL, or validate a raw id.
///
/// Supports the following URL formats:
/// - `https://drive.google.com/drive/folders/<ID>`
/// - `https://drive.google.com/drive/u/0/folders/<ID>`
/// - `https://drive.google.com/file/d/<ID>/view`
/// - `https://drive.google.com/open?id=<ID>`
/// - `https://docs.google.com/spreadsheets/d/<ID>/edit`
/// - Raw ID string
///
/// # Examples
///
/// ```
/// use gworkspace::url_parser::extract_id;
///
/// let id = extract_id("https://docs.google.com/spreadsheets/d/1abc123/edit#gid=0").unwrap();
/// assert_eq!(id, "1abc123");
///
/// let id = extract_id("1abc123").unwrap();
/// assert_eq!(id, "1abc123");
/// ```
pub fn extract_id(url_or_id: &str) -> Result<String> {
    let trimmed = url_or_id.trim();

    for regex in [&FOLDER_URL_REGEX, &FILE_URL_REGEX, &OPEN_URL_REGEX, &DOCS_URL_REGEX] {
        if let Some(id) = regex.captures(trimmed).and_then(|c| c.get(1)) {
            return Ok(id.as_str().to_string());
        }
    }

    if ID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(WorkspaceError::InvalidUrlOrId(url_or_id.to_string()))
}
