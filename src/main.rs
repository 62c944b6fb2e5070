//! gworkspace CLI - Work with Drive folders and Sheets from the terminal.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use gworkspace::address::{parse_cell_ref, parse_range};
use gworkspace::{auth, extract_id, ClientConfig, DriveSession, FolderNode, SheetDocument, SheetsSession};

/// CLI tool for Google Drive folders and Google Sheets.
#[derive(Parser)]
#[command(name = "gworkspace")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the OAuth client secret or service account JSON file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Path of the cached user token.
    #[arg(long, env = "GWORKSPACE_TOKEN_PATH")]
    token: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a folder's subfolder tree.
    Tree {
        /// Folder URL or ID.
        folder: String,
    },

    /// List files in a folder.
    List {
        /// Folder URL or ID.
        folder: String,

        /// Only list files of these MIME types.
        #[arg(long)]
        mime: Vec<String>,
    },

    /// Download the files of a folder into a local directory.
    Download {
        /// Folder URL or ID.
        folder: String,

        /// Only download files of these MIME types.
        #[arg(long)]
        mime: Vec<String>,

        /// Local destination directory.
        #[arg(long, short = 't', default_value = ".")]
        to: PathBuf,
    },

    /// Upload files to a folder.
    Upload {
        /// Destination folder URL or ID.
        folder: String,

        /// File patterns to upload (supports glob patterns like *.tar, file_{1,2,3}.txt).
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Remote name; only valid with a single file.
        #[arg(long)]
        name: Option<String>,
    },

    /// Upload every file directly inside a local directory.
    UploadDir {
        /// Destination folder URL or ID.
        folder: String,

        /// Local directory.
        dir: PathBuf,
    },

    /// Create a subfolder.
    Mkdir {
        /// Parent folder URL or ID.
        folder: String,

        /// Name of the new folder.
        name: String,
    },

    /// Move a file between folders.
    Move {
        /// File URL or ID.
        file: String,

        /// Current folder URL or ID.
        #[arg(long)]
        from: String,

        /// Destination folder URL or ID.
        #[arg(long, short = 't')]
        to: String,
    },

    /// List the sheets of a spreadsheet.
    Sheets {
        /// Spreadsheet URL or ID.
        spreadsheet: String,
    },

    /// Read cell values from a sheet.
    Read {
        /// Spreadsheet URL or ID.
        spreadsheet: String,

        /// Sheet name.
        sheet: String,

        /// A1 range such as A1:E4; whole sheet when omitted.
        #[arg(long)]
        range: Option<String>,
    },

    /// Write rows of comma-separated values into a sheet.
    Write {
        /// Spreadsheet URL or ID.
        spreadsheet: String,

        /// Sheet name.
        sheet: String,

        /// One row of comma-separated values; repeat for more rows.
        #[arg(long = "row", required = true)]
        rows: Vec<String>,

        /// Top-left cell of the write.
        #[arg(long, default_value = "A1")]
        start: String,
    },

    /// Append rows of comma-separated values after a sheet's last row.
    Append {
        /// Spreadsheet URL or ID.
        spreadsheet: String,

        /// Sheet name.
        sheet: String,

        /// One row of comma-separated values; repeat for more rows.
        #[arg(long = "row", required = true)]
        rows: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env().context("Invalid configuration")?;
    if let Some(credentials) = cli.credentials {
        config.credentials_path = credentials;
    }
    if let Some(token) = cli.token {
        config.token_path = token;
    }

    let authenticator = auth::from_config(&config)
        .with_context(|| format!("Failed to load credentials from {:?}", config.credentials_path))?;
    let drive = DriveSession::new(authenticator.clone(), &config);
    let sheets = SheetsSession::new(authenticator, &config);

    match cli.command {
        Commands::Tree { folder } => {
            let folder = open_folder(&drive, &folder, true).await?;
            print!("{}", folder.folder_structure());
        }

        Commands::List { folder, mime } => {
            let folder = open_folder(&drive, &folder, false).await?;
            let mime: Vec<&str> = mime.iter().map(String::as_str).collect();

            let files = folder
                .list_files(&mime)
                .await
                .with_context(|| format!("Failed to list files in folder: {}", folder.id()))?;

            if files.is_empty() {
                println!("No files found.");
            } else {
                println!("{:<44} {:>10} {:<30} {}", "ID", "SIZE", "TYPE", "NAME");
                println!("{}", "-".repeat(100));
                for file in files {
                    println!("{}", file);
                }
            }
        }

        Commands::Download { folder, mime, to } => {
            let folder = open_folder(&drive, &folder, false).await?;
            let mime: Vec<&str> = mime.iter().map(String::as_str).collect();

            std::fs::create_dir_all(&to)
                .with_context(|| format!("Failed to create directory: {:?}", to))?;

            let downloads = folder
                .download_files(&mime)
                .await
                .with_context(|| format!("Failed to list files in folder: {}", folder.id()))?;

            for download in downloads {
                let Some(path) = download_target(&to, &download.name) else {
                    eprintln!("{}: FAILED (not a usable file name)", download.name);
                    continue;
                };
                match download.content {
                    Ok(content) => {
                        std::fs::write(&path, content)
                            .with_context(|| format!("Failed to write {:?}", path))?;
                        println!("{} -> {:?}", download.name, path);
                    }
                    Err(e) => eprintln!("{}: FAILED ({})", download.name, e),
                }
            }
        }

        Commands::Upload { folder, patterns, name } => {
            let folder = open_folder(&drive, &folder, false).await?;
            let files_to_upload = expand_patterns(&patterns)?;

            if files_to_upload.is_empty() {
                anyhow::bail!("No files to upload");
            }
            if name.is_some() && files_to_upload.len() > 1 {
                anyhow::bail!("--name can only be used when uploading a single file");
            }

            println!("Uploading {} file(s) to {}...", files_to_upload.len(), folder.id());

            for (idx, file_path) in files_to_upload.iter().enumerate() {
                let filename = file_path.file_name().unwrap_or_default().to_string_lossy();
                print!("[{}/{}] Uploading {}... ", idx + 1, files_to_upload.len(), filename);

                match folder.upload_file(file_path, name.as_deref()).await {
                    Ok(id) => println!("OK ({})", id),
                    Err(e) => {
                        println!("FAILED");
                        eprintln!("  Error: {}", e);
                    }
                }
            }

            println!("Done.");
        }

        Commands::UploadDir { folder, dir } => {
            let folder = open_folder(&drive, &folder, false).await?;

            let results = folder
                .upload_files_from_directory(&dir)
                .await
                .with_context(|| format!("Failed to read directory: {:?}", dir))?;

            for (path, result) in results {
                match result {
                    Ok(id) => println!("{:?}: OK ({})", path, id),
                    Err(e) => println!("{:?}: FAILED ({})", path, e),
                }
            }
        }

        Commands::Mkdir { folder, name } => {
            let mut folder = open_folder(&drive, &folder, false).await?;

            let created = folder
                .create_subfolder(&name)
                .await
                .with_context(|| format!("Failed to create folder {:?}", name))?;
            println!("{}", created);
        }

        Commands::Move { file, from, to } => {
            let file_id = extract_id(&file)
                .with_context(|| format!("Invalid file URL or ID: {}", file))?;
            let source = open_folder(&drive, &from, false).await?;
            let destination = open_folder(&drive, &to, false).await?;

            let parents = source
                .move_file_from_folder(&file_id, &destination)
                .await
                .with_context(|| format!("Failed to move file: {}", file_id))?;
            println!("Parents: {}", parents.join(", "));
        }

        Commands::Sheets { spreadsheet } => {
            let document = open_spreadsheet(&sheets, &spreadsheet).await?;

            println!("{:<12} {:>8} {:>8} {}", "SHEET ID", "ROWS", "COLS", "NAME");
            for (name, info) in document.sheets() {
                println!("{:<12} {:>8} {:>8} {}", info.sheet_id, info.shape.0, info.shape.1, name);
            }
        }

        Commands::Read { spreadsheet, sheet, range } => {
            let document = open_spreadsheet(&sheets, &spreadsheet).await?;
            let range = range.as_deref().map(parse_range).transpose()?;

            let rows = document
                .read_sheet(&sheet, range.as_ref())
                .await
                .with_context(|| format!("Failed to read sheet: {}", sheet))?;

            for row in rows {
                let cells: Vec<String> = row.iter().map(cell_text).collect();
                println!("{}", cells.join("\t"));
            }
        }

        Commands::Write { spreadsheet, sheet, rows, start } => {
            let document = open_spreadsheet(&sheets, &spreadsheet).await?;
            let start = parse_cell_ref(&start)?;

            let response = document
                .write_to_sheet(&sheet, parse_rows(&rows), start)
                .await
                .with_context(|| format!("Failed to write sheet: {}", sheet))?;
            println!(
                "Updated {} cell(s) in {}",
                response.updated_cells,
                response.updated_range.unwrap_or_default()
            );
        }

        Commands::Append { spreadsheet, sheet, rows } => {
            let document = open_spreadsheet(&sheets, &spreadsheet).await?;

            let response = document
                .append_to_sheet(&sheet, parse_rows(&rows))
                .await
                .with_context(|| format!("Failed to append to sheet: {}", sheet))?;
            println!(
                "Appended {} row(s) to {}",
                response.updates.updated_rows,
                response.updates.updated_range.unwrap_or_default()
            );
        }
    }

    Ok(())
}

async fn open_folder(drive: &DriveSession, folder: &str, with_tree: bool) -> Result<FolderNode> {
    let folder_id = extract_id(folder)
        .with_context(|| format!("Invalid folder URL or ID: {}", folder))?;

    let metadata = drive
        .get(&folder_id)
        .await
        .with_context(|| format!("Failed to fetch folder: {}", folder_id))?;

    let mut node = FolderNode::new(drive.clone(), metadata.id, metadata.name, metadata.parents.into_iter().next());
    if with_tree {
        node.discover_tree()
            .await
            .with_context(|| format!("Failed to discover subfolders of {}", folder_id))?;
    }
    Ok(node)
}

async fn open_spreadsheet(sheets: &SheetsSession, spreadsheet: &str) -> Result<SheetDocument> {
    let spreadsheet_id = extract_id(spreadsheet)
        .with_context(|| format!("Invalid spreadsheet URL or ID: {}", spreadsheet))?;

    SheetDocument::open(sheets.clone(), &spreadsheet_id)
        .await
        .with_context(|| format!("Failed to open spreadsheet: {}", spreadsheet_id))
}

/// Expand brace and glob patterns into a sorted, de-duplicated file list.
fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        for expanded_pattern in expand_braces(pattern) {
            let matches: Vec<PathBuf> = glob(&expanded_pattern)
                .with_context(|| format!("Invalid glob pattern: {}", expanded_pattern))?
                .filter_map(|r| r.ok())
                .filter(|p| p.is_file())
                .collect();

            if matches.is_empty() {
                // If no glob matches, treat as literal path
                let path = PathBuf::from(&expanded_pattern);
                if path.is_file() {
                    files.push(path);
                } else {
                    eprintln!("Warning: No files matched pattern: {}", expanded_pattern);
                }
            } else {
                files.extend(matches);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Expand brace patterns like file_{1,2,3}.txt into multiple patterns.
fn expand_braces(pattern: &str) -> Vec<String> {
    if let Some(start) = pattern.find('{') {
        if let Some(end) = pattern[start..].find('}') {
            let end = start + end;
            let prefix = &pattern[..start];
            let suffix = &pattern[end + 1..];
            let alternatives = &pattern[start + 1..end];

            return alternatives
                .split(',')
                .flat_map(|alt| {
                    let expanded = format!("{}{}{}", prefix, alt.trim(), suffix);
                    expand_braces(&expanded)
                })
                .collect();
        }
    }

    vec![pattern.to_string()]
}

/// Local path for a downloaded file: the last component of the remote name
/// inside `dir`, so remote names cannot point outside it.
fn download_target(dir: &Path, remote_name: &str) -> Option<PathBuf> {
    Path::new(remote_name).file_name().map(|name| dir.join(name))
}

fn parse_rows(rows: &[String]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| row.split(',').map(|cell| Value::String(cell.trim().to_string())).collect())
        .collect()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
