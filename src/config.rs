//! Client configuration: credential locations, scopes and API endpoints.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, WorkspaceError};

/// Google Drive API scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Google Sheets API scope.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth2 consent endpoint.
pub const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API v3.
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Base URL for Google Sheets API v4.
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// Resumable upload chunks must be multiples of this size.
pub const UPLOAD_CHUNK_GRANULARITY: usize = 256 * 1024;

const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 32 * UPLOAD_CHUNK_GRANULARITY;

/// Settings shared by the authenticators and API sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client secret (installed app) or service-account key file.
    pub credentials_path: PathBuf,
    /// Cached user token, written after consent and refresh.
    pub token_path: PathBuf,
    pub scopes: Vec<String>,
    pub token_uri: String,
    pub auth_uri: String,
    pub drive_api_base: String,
    pub upload_api_base: String,
    pub sheets_api_base: String,
    pub upload_chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            scopes: vec![DRIVE_SCOPE.to_string(), SPREADSHEETS_SCOPE.to_string()],
            token_uri: TOKEN_URI.to_string(),
            auth_uri: AUTH_URI.to_string(),
            drive_api_base: DRIVE_API_BASE.to_string(),
            upload_api_base: UPLOAD_API_BASE.to_string(),
            sheets_api_base: SHEETS_API_BASE.to_string(),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `GOOGLE_APPLICATION_CREDENTIALS`,
    /// `GWORKSPACE_TOKEN_PATH` and `GWORKSPACE_UPLOAD_CHUNK_SIZE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            config.credentials_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("GWORKSPACE_TOKEN_PATH") {
            config.token_path = PathBuf::from(path);
        }
        if let Ok(size) = env::var("GWORKSPACE_UPLOAD_CHUNK_SIZE") {
            config.upload_chunk_size = size.parse().map_err(|_| {
                WorkspaceError::ConfigError(format!("GWORKSPACE_UPLOAD_CHUNK_SIZE is not a number: {}", size))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Point every API endpoint at one base URL (used against mock servers).
    pub fn with_api_root(mut self, root: &str) -> Self {
        let root = root.trim_end_matches('/');
        self.token_uri = format!("{}/token", root);
        self.auth_uri = format!("{}/auth", root);
        self.drive_api_base = format!("{}/drive/v3", root);
        self.upload_api_base = format!("{}/upload/drive/v3", root);
        self.sheets_api_base = format!("{}/v4", root);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload_chunk_size == 0 || self.upload_chunk_size % UPLOAD_CHUNK_GRANULARITY != 0 {
            return Err(WorkspaceError::ConfigError(format!(
                "upload_chunk_size must be a positive multiple of {} bytes, got {}",
                UPLOAD_CHUNK_GRANULARITY, self.upload_chunk_size
            )));
        }
        if self.scopes.is_empty() {
            return Err(WorkspaceError::ConfigError("at least one scope is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.credentials_path, PathBuf::from("credentials.json"));
        assert_eq!(config.token_path, PathBuf::from("token.json"));
        assert_eq!(config.scopes, vec![DRIVE_SCOPE, SPREADSHEETS_SCOPE]);
        assert_eq!(config.upload_chunk_size, 8 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_api_root() {
        let config = ClientConfig::default().with_api_root("http://127.0.0.1:1234/");
        assert_eq!(config.drive_api_base, "http://127.0.0.1:1234/drive/v3");
        assert_eq!(config.upload_api_base, "http://127.0.0.1:1234/upload/drive/v3");
        assert_eq!(config.sheets_api_base, "http://127.0.0.1:1234/v4");
        assert_eq!(config.token_uri, "http://127.0.0.1:1234/token");
    }

    #[test]
    fn test_validate_rejects_bad_chunk_size() {
        let config = ClientConfig {
            upload_chunk_size: 1000,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(WorkspaceError::ConfigError(_))));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"token_path": "/tmp/tok.json", "scopes": ["a"]}"#).unwrap();
        assert_eq!(config.token_path, PathBuf::from("/tmp/tok.json"));
        assert_eq!(config.scopes, vec!["a"]);
        assert_eq!(config.drive_api_base, DRIVE_API_BASE);
    }
}
