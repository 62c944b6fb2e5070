//! Error types for the gworkspace crate.

use thiserror::Error;

/// Errors that can occur when talking to Google Drive or Google Sheets.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),

    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    #[error("Cannot write an empty set of rows")]
    EmptyValues,

    #[error("Folder {folder_id} is not a parent of file {file_id}")]
    NotAParent { file_id: String, folder_id: String },

    #[error("No upload URL in response")]
    MissingUploadUrl,

    #[error("Upload made no progress past byte {offset}")]
    UploadStalled { offset: u64 },

    #[error("Invalid local path: {0}")]
    InvalidPath(String),

    #[error("Row {row} has {len} cells but the table has {columns} columns")]
    RaggedRow { row: usize, len: usize, columns: usize },

    #[error("JWT encoding error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),

    #[error("Consent flow failed: {0}")]
    ConsentFlowError(String),
}

impl WorkspaceError {
    /// Whether the error came from a remote API call (transport or non-2xx reply)
    /// rather than from local validation or I/O.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            WorkspaceError::HttpError(_)
                | WorkspaceError::ApiError { .. }
                | WorkspaceError::MissingUploadUrl
                | WorkspaceError::UploadStalled { .. }
        )
    }
}

/// Result type alias for WorkspaceError.
pub type Result<T> = std::result::Result<T, WorkspaceError>;
