//! Authenticated sessions against the Google Drive v3 and Sheets v4 REST APIs.
//!
//! These are thin request builders: every method maps to one remote call
//! (or one paged/chunked sequence of calls) and unwraps the reply into a
//! model type or a [`WorkspaceError`].

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::{json, Value};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, instrument, warn};

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::error::{Result, WorkspaceError};
use crate::models::{
    ApiErrorResponse, AppendValuesResponse, FileListResponse, FileMetadata, Spreadsheet,
    UpdateValuesResponse, ValueRange, FOLDER_MIME_TYPE,
};

/// Fields requested for file resources.
const FILE_FIELDS: &str = "id, name, mimeType, size, parents";

/// Value input mode for writes: values are parsed as if typed into the UI.
const USER_ENTERED: &str = "USER_ENTERED";

/// Resumable upload "chunk accepted, send more" status (308 Resume Incomplete).
const RESUME_INCOMPLETE: StatusCode = StatusCode::PERMANENT_REDIRECT;

/// Consecutive 308 replies without new committed bytes before giving up.
const MAX_STALLED_CHUNKS: u32 = 3;

/// Turn a non-2xx reply into an `ApiError`, decoding Google's error envelope
/// when the body carries one.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(WorkspaceError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(WorkspaceError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}

/// Append percent-encoded path segments to a base URL.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| WorkspaceError::ConfigError(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| WorkspaceError::ConfigError(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Session against the Google Drive API.
#[derive(Clone)]
pub struct DriveSession {
    auth: Arc<dyn Authenticator>,
    http: Client,
    api_base: String,
    upload_base: String,
    chunk_size: usize,
}

impl DriveSession {
    /// Create a new session.
    ///
    /// # Arguments
    /// * `auth` - Authenticator for obtaining access tokens
    /// * `config` - Endpoints and upload chunk size
    pub fn new(auth: Arc<dyn Authenticator>, config: &ClientConfig) -> Self {
        Self {
            auth,
            http: Client::new(),
            api_base: config.drive_api_base.clone(),
            upload_base: config.upload_api_base.clone(),
            chunk_size: config.upload_chunk_size,
        }
    }

    /// Query files using Google Drive query syntax, following every page.
    #[instrument(skip(self))]
    pub async fn list(&self, query: &str) -> Result<Vec<FileMetadata>> {
        let token = self.auth.access_token().await?;
        let url = endpoint(&self.api_base, &["files"])?;
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(url.clone())
                .bearer_auth(&token)
                .query(&[
                    ("q", query),
                    ("includeItemsFromAllDrives", "true"),
                    ("supportsAllDrives", "true"),
                    ("spaces", "drive"),
                    ("fields", fields.as_str()),
                ]);

            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = check_status(request.send().await?).await?;
            let list_response: FileListResponse = response.json().await?;
            debug!(count = list_response.files.len(), "Fetched file list page");
            all_files.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// Get file metadata by ID.
    #[instrument(skip(self))]
    pub async fn get(&self, file_id: &str) -> Result<FileMetadata> {
        let token = self.auth.access_token().await?;

        let response = self
            .http
            .get(endpoint(&self.api_base, &["files", file_id])?)
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Download a file's content into memory, one network chunk at a time.
    #[instrument(skip(self))]
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let token = self.auth.access_token().await?;

        let response = self
            .http
            .get(endpoint(&self.api_base, &["files", file_id])?)
            .bearer_auth(&token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;

        let response = check_status(response).await?;
        let mut content = Vec::with_capacity(capacity_hint(response.content_length(), self.chunk_size));
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            content.extend_from_slice(&chunk);
        }

        debug!(bytes = content.len(), "Download complete");
        Ok(content)
    }

    /// Create a folder with a single parent.
    #[instrument(skip(self))]
    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<FileMetadata> {
        let token = self.auth.access_token().await?;
        let metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id]
        });

        let response = self
            .http
            .post(endpoint(&self.api_base, &["files"])?)
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .json(&metadata)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Swap parents of a file in one update.
    #[instrument(skip(self))]
    pub async fn update_parents(&self, file_id: &str, add_parent: &str, remove_parent: &str) -> Result<FileMetadata> {
        let token = self.auth.access_token().await?;

        let response = self
            .http
            .patch(endpoint(&self.api_base, &["files", file_id])?)
            .bearer_auth(&token)
            .query(&[
                ("addParents", add_parent),
                ("removeParents", remove_parent),
                ("supportsAllDrives", "true"),
                ("fields", "id, parents"),
            ])
            .json(&json!({}))
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Upload a local file into `parent_id` using the resumable protocol.
    ///
    /// The file is sent in `chunk_size` pieces; after each incomplete (308)
    /// reply the next piece starts at the offset the server reports committed,
    /// which is zero when the reply carries no `Range` header. Fails with
    /// [`WorkspaceError::UploadStalled`] after repeated replies that commit
    /// nothing new.
    #[instrument(skip(self, local_path), fields(path = %local_path.display()))]
    pub async fn upload(&self, local_path: &Path, name: &str, parent_id: &str, mime_type: &str) -> Result<FileMetadata> {
        let token = self.auth.access_token().await?;
        let mut file = File::open(local_path).await?;
        let total = file.metadata().await?.len();

        let metadata = json!({
            "name": name,
            "parents": [parent_id]
        });

        // Step 1: Initiate resumable upload
        let init_response = self
            .http
            .post(endpoint(&self.upload_base, &["files"])?)
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", total.to_string())
            .json(&metadata)
            .send()
            .await?;

        let init_response = check_status(init_response).await?;
        let upload_url = init_response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(WorkspaceError::MissingUploadUrl)?
            .to_string();

        // Step 2: Send the content chunk by chunk
        let mut offset: u64 = 0;
        let mut stalled = 0;
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            file.seek(SeekFrom::Start(offset)).await?;
            let len = read_chunk(&mut file, &mut buffer).await?;
            let content_range = if len == 0 {
                format!("bytes */{}", total)
            } else {
                format!("bytes {}-{}/{}", offset, offset + len as u64 - 1, total)
            };

            let response = self
                .http
                .put(&upload_url)
                .bearer_auth(&token)
                .header(CONTENT_TYPE, mime_type)
                .header(CONTENT_LENGTH, len.to_string())
                .header(CONTENT_RANGE, content_range)
                .body(buffer[..len].to_vec())
                .send()
                .await?;

            if response.status() == RESUME_INCOMPLETE {
                let committed = committed_offset(&response).unwrap_or(0);
                if committed > offset {
                    stalled = 0;
                } else {
                    stalled += 1;
                    warn!(offset, committed, "Upload chunk not committed");
                    if stalled >= MAX_STALLED_CHUNKS {
                        return Err(WorkspaceError::UploadStalled { offset: committed });
                    }
                }
                offset = committed;
                debug!(offset, total, "Chunk accepted");
                continue;
            }

            let metadata: FileMetadata = check_status(response).await?.json().await?;
            return Ok(metadata);
        }
    }
}

/// Fill `buffer` from `file`, stopping early only at end of file.
async fn read_chunk(file: &mut File, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Initial buffer size for a download: the declared length, capped at `cap`.
fn capacity_hint(content_length: Option<u64>, cap: usize) -> usize {
    content_length.map_or(0, |len| len.min(cap as u64) as usize)
}

/// Next byte to send after a 308 reply, from its `Range: bytes=0-N` header.
fn committed_offset(response: &Response) -> Option<u64> {
    let range = response.headers().get(RANGE)?.to_str().ok()?;
    let (_, last) = range.strip_prefix("bytes=")?.split_once('-')?;
    last.parse::<u64>().ok().map(|last| last + 1)
}

/// Session against the Google Sheets API.
#[derive(Clone)]
pub struct SheetsSession {
    auth: Arc<dyn Authenticator>,
    http: Client,
    api_base: String,
}

impl SheetsSession {
    pub fn new(auth: Arc<dyn Authenticator>, config: &ClientConfig) -> Self {
        Self {
            auth,
            http: Client::new(),
            api_base: config.sheets_api_base.clone(),
        }
    }

    /// Fetch the spreadsheet's sheet properties.
    #[instrument(skip(self))]
    pub async fn get_spreadsheet(&self, spreadsheet_id: &str) -> Result<Spreadsheet> {
        let token = self.auth.access_token().await?;

        let response = self
            .http
            .get(endpoint(&self.api_base, &["spreadsheets", spreadsheet_id])?)
            .bearer_auth(&token)
            .query(&[("fields", "spreadsheetId,sheets.properties")])
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Read the values in an A1 range.
    #[instrument(skip(self))]
    pub async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<ValueRange> {
        let token = self.auth.access_token().await?;

        let response = self
            .http
            .get(endpoint(&self.api_base, &["spreadsheets", spreadsheet_id, "values", range])?)
            .bearer_auth(&token)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Overwrite the values in an A1 range.
    #[instrument(skip(self, values), fields(rows = values.len()))]
    pub async fn update_values(&self, spreadsheet_id: &str, range: &str, values: Vec<Vec<Value>>) -> Result<UpdateValuesResponse> {
        let token = self.auth.access_token().await?;
        let body = ValueRange {
            range: Some(range.to_string()),
            major_dimension: Some("ROWS".to_string()),
            values,
        };

        let response = self
            .http
            .put(endpoint(&self.api_base, &["spreadsheets", spreadsheet_id, "values", range])?)
            .bearer_auth(&token)
            .query(&[("valueInputOption", USER_ENTERED)])
            .json(&body)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Append rows after the last populated row of the table found in `range`.
    #[instrument(skip(self, values), fields(rows = values.len()))]
    pub async fn append_values(&self, spreadsheet_id: &str, range: &str, values: Vec<Vec<Value>>) -> Result<AppendValuesResponse> {
        let token = self.auth.access_token().await?;
        let body = ValueRange {
            range: None,
            major_dimension: Some("ROWS".to_string()),
            values,
        };
        let target = format!("{}:append", range);

        let response = self
            .http
            .post(endpoint(&self.api_base, &["spreadsheets", spreadsheet_id, "values", &target])?)
            .bearer_auth(&token)
            .query(&[("valueInputOption", USER_ENTERED)])
            .json(&body)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = endpoint("https://sheets.googleapis.com/v4", &["spreadsheets", "abc", "values", "'My Sheet'!A1:B2"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'My%20Sheet'!A1:B2"
        );
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let url = endpoint("http://localhost:1234/drive/v3/", &["files"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:1234/drive/v3/files");
    }

    #[test]
    fn test_capacity_hint_is_capped() {
        assert_eq!(capacity_hint(None, 1024), 0);
        assert_eq!(capacity_hint(Some(10), 1024), 10);
        assert_eq!(capacity_hint(Some(u64::MAX), 1024), 1024);
    }

    #[test]
    fn test_endpoint_escapes_slashes_in_ids() {
        let url = endpoint("http://localhost/drive/v3", &["files", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost/drive/v3/files/a%2Fb");
    }
}
