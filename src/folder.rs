//! A Drive folder and the operations scoped to it.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tracing::{info, instrument, warn};

use crate::client::DriveSession;
use crate::error::{Result, WorkspaceError};
use crate::models::{FileMetadata, FOLDER_MIME_TYPE};

/// Drive query for the non-trashed direct children of `folder_id`, optionally
/// restricted to any of `mime_types`.
pub fn children_query(folder_id: &str, mime_types: &[&str]) -> String {
    let mut query = format!("'{}' in parents and trashed=false", escape_query_value(folder_id));

    if !mime_types.is_empty() {
        let alternatives: Vec<String> = mime_types
            .iter()
            .map(|m| format!("mimeType='{}'", escape_query_value(m)))
            .collect();
        query.push_str(&format!(" and ({})", alternatives.join(" or ")));
    }

    query
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Outcome of downloading one listed file.
#[derive(Debug)]
pub struct DownloadedFile {
    pub id: String,
    pub name: String,
    pub content: Result<Vec<u8>>,
}

/// One folder in a Drive hierarchy.
///
/// The node owns its subfolders in listing order; names are unique among
/// them. The parent is referenced by id only. The child map is a snapshot from the last discovery and is
/// not kept in sync with remote changes, except for folders created through
/// [`FolderNode::create_subfolder`].
pub struct FolderNode {
    session: DriveSession,
    id: String,
    name: String,
    parent_id: Option<String>,
    children: Vec<FolderNode>,
}

impl FolderNode {
    /// Wrap a folder without contacting the API. Call
    /// [`discover_children`](Self::discover_children) or
    /// [`discover_tree`](Self::discover_tree) to populate subfolders.
    pub fn new(session: DriveSession, id: impl Into<String>, name: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            session,
            id: id.into(),
            name: name.into(),
            parent_id,
            children: Vec::new(),
        }
    }

    /// Wrap a folder and eagerly discover its whole subfolder tree.
    ///
    /// This issues one listing per folder in the tree, sequentially.
    pub async fn open(session: DriveSession, id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let mut node = Self::new(session, id, name, None);
        node.discover_tree().await?;
        Ok(node)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn children(&self) -> &[FolderNode] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&FolderNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut FolderNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Register `child`, taking the place of an existing child with the same
    /// name or going last otherwise.
    fn insert_child(&mut self, child: FolderNode) -> &FolderNode {
        let idx = match self.children.iter().position(|c| c.name == child.name) {
            Some(idx) => {
                self.children[idx] = child;
                idx
            }
            None => {
                self.children.push(child);
                self.children.len() - 1
            }
        };
        &self.children[idx]
    }

    /// Replace the children with the folder's current direct subfolders, in
    /// listing order. A later subfolder with an already seen name replaces the
    /// earlier one. The new children are not themselves discovered.
    pub async fn discover_children(&mut self) -> Result<()> {
        let folders = self.list_files(&[FOLDER_MIME_TYPE]).await?;

        self.children.clear();
        for f in folders {
            let child = FolderNode::new(self.session.clone(), f.id, f.name, Some(self.id.clone()));
            self.insert_child(child);
        }

        Ok(())
    }

    /// Discover subfolders recursively, replacing the whole subtree.
    pub fn discover_tree(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.discover_children().await?;
            for child in self.children.iter_mut() {
                child.discover_tree().await?;
            }
            Ok(())
        })
    }

    /// Indented tree of folder names, one tab per level.
    pub fn folder_structure(&self) -> String {
        let mut out = String::new();
        self.write_structure(0, &mut out);
        out
    }

    fn write_structure(&self, level: usize, out: &mut String) {
        out.push_str(&"\t".repeat(level));
        out.push_str(&self.name);
        out.push('\n');
        for child in &self.children {
            child.write_structure(level + 1, out);
        }
    }

    /// List non-trashed files directly in this folder, across all pages.
    ///
    /// An empty `mime_types` lists every entry; otherwise only entries of
    /// one of the given types.
    #[instrument(skip(self), fields(folder = %self.id))]
    pub async fn list_files(&self, mime_types: &[&str]) -> Result<Vec<FileMetadata>> {
        let query = children_query(&self.id, mime_types);
        self.session
            .list(&query)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to list folder"))
    }

    /// Download one file's content.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.session
            .download(file_id)
            .await
            .inspect_err(|e| warn!(file_id, error = %e, "Download failed"))
    }

    /// Download every listed file, in listing order.
    ///
    /// A failed download is recorded in that file's entry and does not stop
    /// the batch; only a failed listing fails the whole call.
    #[instrument(skip(self), fields(folder = %self.id))]
    pub async fn download_files(&self, mime_types: &[&str]) -> Result<Vec<DownloadedFile>> {
        let files = self.list_files(mime_types).await?;
        let mut downloads = Vec::with_capacity(files.len());

        for file in files {
            let content = self.download_file(&file.id).await;
            if let Ok(bytes) = &content {
                info!(file = %file.name, bytes = bytes.len(), "File downloaded");
            }
            downloads.push(DownloadedFile {
                id: file.id,
                name: file.name,
                content,
            });
        }

        Ok(downloads)
    }

    /// Upload a local file into this folder and return its new id.
    ///
    /// The remote name is `new_name` if given, else the local file name. The
    /// MIME type is guessed from the extension.
    pub async fn upload_file<P: AsRef<Path>>(&self, local_path: P, new_name: Option<&str>) -> Result<String> {
        let local_path = local_path.as_ref();
        let name = match new_name {
            Some(name) if !name.is_empty() => name,
            _ => local_path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| WorkspaceError::InvalidPath(local_path.display().to_string()))?,
        };
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();

        let metadata = self
            .session
            .upload(local_path, name, &self.id, &mime_type)
            .await
            .inspect_err(|e| warn!(path = %local_path.display(), error = %e, "Upload failed"))?;

        info!(file = name, id = %metadata.id, "File uploaded");
        Ok(metadata.id)
    }

    /// Upload each path in order; one failure does not stop the rest.
    pub async fn upload_files<P: AsRef<Path>>(&self, local_paths: &[P]) -> Vec<Result<String>> {
        let mut ids = Vec::with_capacity(local_paths.len());
        for path in local_paths {
            ids.push(self.upload_file(path, None).await);
        }
        ids
    }

    /// Upload the regular files directly inside `dir_path` (not recursive),
    /// in name order.
    pub async fn upload_files_from_directory<P: AsRef<Path>>(&self, dir_path: P) -> Result<Vec<(PathBuf, Result<String>)>> {
        let mut entries = tokio::fs::read_dir(dir_path.as_ref()).await?;
        let mut paths = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if tokio::fs::metadata(&path).await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let ids = self.upload_files(&paths).await;
        Ok(paths.into_iter().zip(ids).collect())
    }

    /// Move a file from this folder into `destination`, returning its new
    /// parent ids.
    ///
    /// Fails with [`WorkspaceError::NotAParent`] without modifying anything
    /// if this folder is not currently one of the file's parents.
    #[instrument(skip(self, destination), fields(from = %self.id, to = %destination.id))]
    pub async fn move_file_from_folder(&self, file_id: &str, destination: &FolderNode) -> Result<Vec<String>> {
        let file = self
            .session
            .get(file_id)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to fetch file parents"))?;

        if !file.parents.iter().any(|p| p == &self.id) {
            return Err(WorkspaceError::NotAParent {
                file_id: file_id.to_string(),
                folder_id: self.id.clone(),
            });
        }

        let updated = self
            .session
            .update_parents(file_id, &destination.id, &self.id)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to move file"))?;

        Ok(updated.parents)
    }

    /// Create a subfolder and register it under `name`, replacing any child
    /// already registered with that name.
    #[instrument(skip(self), fields(parent = %self.id))]
    pub async fn create_subfolder(&mut self, name: &str) -> Result<&FolderNode> {
        let created = self
            .session
            .create_folder(name, &self.id)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to create folder"))?;

        info!(id = %created.id, "Folder created");
        let folder = FolderNode::new(self.session.clone(), created.id, name, Some(self.id.clone()));
        Ok(self.insert_child(folder))
    }
}

impl fmt::Display for FolderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name: {}, id: {}", self.name, self.id)
    }
}

impl fmt::Debug for FolderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent_id", &self.parent_id)
            .field("children", &self.children)
            .finish()
    }
}
