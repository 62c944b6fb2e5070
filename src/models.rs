//! Data models for Google Drive and Google Sheets API payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Metadata for a file or folder in Google Drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl FileMetadata {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl std::fmt::Display for FileMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size_str = self
            .size
            .map(format_size)
            .unwrap_or_else(|| "-".to_string());
        let mime = self.mime_type.as_deref().unwrap_or("-");
        write!(f, "{}\t{}\t{}\t{}", self.id, size_str, mime, self.name)
    }
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileMetadata>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth client secret as downloaded from the Cloud console.
///
/// The console wraps the secret in an `installed` or `web` object depending on
/// the client type.
#[derive(Debug, Deserialize)]
pub struct ClientSecretFile {
    #[serde(alias = "web")]
    pub installed: ClientSecret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Spreadsheet resource, trimmed to the sheet list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spreadsheet {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
pub struct Sheet {
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
    #[serde(default)]
    pub grid_properties: GridProperties,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridProperties {
    #[serde(default)]
    pub row_count: u32,
    #[serde(default)]
    pub column_count: u32,
}

/// A block of cell values, as returned by values.get and sent to values.update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_dimension: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

/// Response from values.update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: u32,
    #[serde(default)]
    pub updated_columns: u32,
    #[serde(default)]
    pub updated_cells: u32,
}

/// Response from values.append.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendValuesResponse {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub table_range: Option<String>,
    #[serde(default)]
    pub updates: UpdateValuesResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(format_size(1073741824), "1.00 GB");
    }

    #[test]
    fn test_file_metadata_deserialize() {
        let json = r#"{
            "id": "abc123",
            "name": "test.txt",
            "mimeType": "text/plain",
            "size": "1024",
            "parents": ["p1"]
        }"#;

        let metadata: FileMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.id, "abc123");
        assert_eq!(metadata.name, "test.txt");
        assert_eq!(metadata.mime_type, Some("text/plain".to_string()));
        assert_eq!(metadata.size, Some(1024));
        assert_eq!(metadata.parents, vec!["p1"]);
        assert!(!metadata.is_folder());
    }

    #[test]
    fn test_file_metadata_display() {
        let metadata = FileMetadata {
            id: "abc123".to_string(),
            name: "test.txt".to_string(),
            mime_type: Some("text/plain".to_string()),
            size: Some(1024),
            parents: Vec::new(),
        };

        let display = format!("{}", metadata);
        assert!(display.contains("abc123"));
        assert!(display.contains("test.txt"));
        assert!(display.contains("1.00 KB"));
    }

    #[test]
    fn test_client_secret_accepts_web_and_installed() {
        let installed: ClientSecretFile = serde_json::from_str(
            r#"{"installed": {"client_id": "id", "client_secret": "s"}}"#,
        )
        .unwrap();
        assert_eq!(installed.installed.client_id, "id");

        let web: ClientSecretFile = serde_json::from_str(
            r#"{"web": {"client_id": "w", "client_secret": "s", "token_uri": "https://t"}}"#,
        )
        .unwrap();
        assert_eq!(web.installed.client_id, "w");
        assert_eq!(web.installed.token_uri.as_deref(), Some("https://t"));
    }

    #[test]
    fn test_spreadsheet_deserialize() {
        let json = r#"{
            "spreadsheetId": "ss1",
            "sheets": [
                {"properties": {"sheetId": 0, "title": "Sheet1",
                    "gridProperties": {"rowCount": 1000, "columnCount": 26}}},
                {"properties": {"sheetId": 42, "title": "Data"}}
            ]
        }"#;

        let spreadsheet: Spreadsheet = serde_json::from_str(json).unwrap();
        assert_eq!(spreadsheet.sheets.len(), 2);
        assert_eq!(spreadsheet.sheets[0].properties.grid_properties.row_count, 1000);
        assert_eq!(spreadsheet.sheets[1].properties.sheet_id, 42);
        assert_eq!(spreadsheet.sheets[1].properties.grid_properties.column_count, 0);
    }
}
