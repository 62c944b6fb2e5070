//! gworkspace - Convenience wrappers over Google Drive folders and Google Sheets.
//!
//! This library provides:
//! - [`FolderNode`]: a Drive folder with its discovered subfolder tree, and
//!   list/download/upload/move/create operations scoped to it
//! - [`SheetDocument`]: a spreadsheet with cached sheet metadata, and
//!   read/write/append operations on A1 ranges
//! - [`address`]: the zero-based `(row, col)` to A1 range arithmetic
//!
//! # Example
//!
//! ```no_run
//! use gworkspace::{auth, ClientConfig, DriveSession, FolderNode, SheetDocument, SheetsSession};
//! use gworkspace::address::CellRange;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let auth = auth::from_config(&config)?;
//!
//!     let folder = FolderNode::open(DriveSession::new(auth.clone(), &config), "folder-id", "My Folder").await?;
//!     let images = folder.download_files(&["image/jpeg"]).await?;
//!     println!("{} images", images.len());
//!
//!     let spreadsheet = SheetDocument::open(SheetsSession::new(auth, &config), "spreadsheet-id").await?;
//!     let subset = spreadsheet
//!         .read_sheet("Sheet1", Some(&CellRange::new((0, 0), (3, 4))?))
//!         .await?;
//!     println!("{:?}", subset);
//!
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod folder;
pub mod models;
pub mod sheet;
pub mod table;
pub mod url_parser;

// Re-exports for convenience
pub use address::{CellRange, CellRef, EndColumnRule};
pub use auth::Authenticator;
pub use client::{DriveSession, SheetsSession};
pub use config::ClientConfig;
pub use error::{Result, WorkspaceError};
pub use folder::{DownloadedFile, FolderNode};
pub use models::FileMetadata;
pub use sheet::{SheetDocument, SheetInfo};
pub use table::Table;
pub use url_parser::extract_id;
