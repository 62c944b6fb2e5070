//! Tests for FolderNode against a mocked Drive API.

use std::sync::Arc;

use gworkspace::auth::StaticToken;
use gworkspace::folder::children_query;
use gworkspace::models::FOLDER_MIME_TYPE;
use gworkspace::{ClientConfig, DriveSession, FolderNode, WorkspaceError};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;

fn session(server: &ServerGuard) -> DriveSession {
    let config = ClientConfig::default().with_api_root(&server.url());
    DriveSession::new(Arc::new(StaticToken::new("test-token")), &config)
}

async fn mock_subfolders(server: &mut ServerGuard, folder_id: &str, children: &[(&str, &str)]) -> Mock {
    let files: Vec<_> = children
        .iter()
        .map(|(id, name)| json!({"id": id, "name": name, "mimeType": FOLDER_MIME_TYPE}))
        .collect();

    server
        .mock("GET", "/drive/v3/files")
        .match_query(Matcher::UrlEncoded(
            "q".into(),
            children_query(folder_id, &[FOLDER_MIME_TYPE]),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "files": files }).to_string())
        .create_async()
        .await
}

mod discovery {
    use super::*;

    #[tokio::test]
    async fn open_discovers_whole_tree() {
        let mut server = Server::new_async().await;
        mock_subfolders(&mut server, "root", &[("a", "Alpha"), ("b", "Beta")]).await;
        mock_subfolders(&mut server, "a", &[("a1", "Alpha One")]).await;
        mock_subfolders(&mut server, "b", &[]).await;
        mock_subfolders(&mut server, "a1", &[]).await;

        let root = FolderNode::open(session(&server), "root", "Root").await.unwrap();

        assert_eq!(root.children().len(), 2);
        let alpha = root.child("Alpha").unwrap();
        assert_eq!(alpha.id(), "a");
        assert_eq!(alpha.parent_id(), Some("root"));
        assert_eq!(alpha.child("Alpha One").unwrap().id(), "a1");
        assert_eq!(
            root.folder_structure(),
            "Root\n\tAlpha\n\t\tAlpha One\n\tBeta\n"
        );
    }

    #[tokio::test]
    async fn discover_children_is_one_level() {
        let mut server = Server::new_async().await;
        let listing = mock_subfolders(&mut server, "root", &[("a", "Alpha")]).await;

        let mut root = FolderNode::new(session(&server), "root", "Root", None);
        assert!(root.children().is_empty());

        root.discover_children().await.unwrap();
        listing.assert_async().await;

        assert!(root.child("Alpha").unwrap().children().is_empty());
    }

    #[tokio::test]
    async fn children_keep_listing_order() {
        let mut server = Server::new_async().await;
        mock_subfolders(&mut server, "root", &[("z", "Zulu"), ("m", "Mike"), ("a", "Alpha")]).await;

        let mut root = FolderNode::new(session(&server), "root", "Root", None);
        root.discover_children().await.unwrap();

        let names: Vec<&str> = root.children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Zulu", "Mike", "Alpha"]);
        assert_eq!(root.folder_structure(), "Root\n\tZulu\n\tMike\n\tAlpha\n");
    }

    #[tokio::test]
    async fn open_fails_when_listing_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(json!({"error": {"code": 404, "message": "File not found: root."}}).to_string())
            .create_async()
            .await;

        let err = FolderNode::open(session(&server), "root", "Root").await.unwrap_err();
        assert!(err.is_remote());
        assert!(matches!(err, WorkspaceError::ApiError { status: 404, .. }));
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn list_files_merges_pages_in_order() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/drive/v3/files")
            .match_query(Matcher::Regex(r"fields=[^&]*$".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "files": [{"id": "f1", "name": "one.txt"}, {"id": "f2", "name": "two.txt"}],
                    "nextPageToken": "page-2"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/drive/v3/files")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "page-2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [{"id": "f3", "name": "three.txt"}]}).to_string())
            .expect(1)
            .create_async()
            .await;

        let folder = FolderNode::new(session(&server), "folder1", "Folder", None);
        let files = folder.list_files(&[]).await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2", "f3"]);
    }

    #[tokio::test]
    async fn list_files_sends_query_and_drive_flags() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/drive/v3/files")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "q".into(),
                    "'folder1' in parents and trashed=false and (mimeType='image/jpeg' or mimeType='image/png')".into(),
                ),
                Matcher::UrlEncoded("supportsAllDrives".into(), "true".into()),
                Matcher::UrlEncoded("includeItemsFromAllDrives".into(), "true".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [{"id": "img", "name": "cat.jpg", "mimeType": "image/jpeg"}]}).to_string())
            .create_async()
            .await;

        let folder = FolderNode::new(session(&server), "folder1", "Folder", None);
        let files = folder.list_files(&["image/jpeg", "image/png"]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "cat.jpg");
    }

    #[tokio::test]
    async fn empty_folder_is_ok_not_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;

        let folder = FolderNode::new(session(&server), "folder1", "Folder", None);
        assert!(folder.list_files(&[]).await.unwrap().is_empty());
    }
}

mod downloads {
    use super::*;

    #[tokio::test]
    async fn download_files_keeps_order_and_isolates_failures() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"files": [
                    {"id": "f1", "name": "a.bin"},
                    {"id": "f2", "name": "b.bin"},
                    {"id": "f3", "name": "c.bin"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/drive/v3/files/f1")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(200)
            .with_body(b"first")
            .create_async()
            .await;
        server
            .mock("GET", "/drive/v3/files/f2")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(json!({"error": {"code": 403, "message": "Only files with binary content can be downloaded."}}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/drive/v3/files/f3")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(vec![0u8, 1, 2, 255])
            .create_async()
            .await;

        let folder = FolderNode::new(session(&server), "folder1", "Folder", None);
        let downloads = folder.download_files(&[]).await.unwrap();

        let names: Vec<&str> = downloads.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.bin", "b.bin", "c.bin"]);
        assert_eq!(downloads[0].content.as_ref().unwrap(), b"first");
        assert!(matches!(
            downloads[1].content,
            Err(WorkspaceError::ApiError { status: 403, .. })
        ));
        assert_eq!(downloads[2].content.as_ref().unwrap(), &vec![0u8, 1, 2, 255]);
    }
}

mod uploads {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    async fn mock_upload_session(server: &mut ServerGuard, session_path: &str) -> Mock {
        let location = format!("{}{}", server.url(), session_path);
        server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "resumable".into()))
            .with_status(200)
            .with_header("location", &location)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn upload_file_uses_new_name_and_guessed_mime() {
        let mut server = Server::new_async().await;
        let location = format!("{}/upload/session/1", server.url());
        let init = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "resumable".into()))
            .match_header("x-upload-content-type", "text/csv")
            .match_header("x-upload-content-length", "11")
            .match_body(Matcher::PartialJson(json!({
                "name": "renamed.csv",
                "parents": ["folder1"]
            })))
            .with_status(200)
            .with_header("location", &location)
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/upload/session/1")
            .match_header("content-range", "bytes 0-10/11")
            .match_body("a,b\n1,2\n3,4")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "new-file", "name": "renamed.csv"}).to_string())
            .create_async()
            .await;

        let mut local = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        local.write_all(b"a,b\n1,2\n3,4").unwrap();

        let folder = FolderNode::new(session(&server), "folder1", "Folder", None);
        let id = folder.upload_file(local.path(), Some("renamed.csv")).await.unwrap();

        init.assert_async().await;
        put.assert_async().await;
        assert_eq!(id, "new-file");
    }

    #[tokio::test]
    async fn upload_file_sends_chunks_until_complete() {
        let mut server = Server::new_async().await;
        mock_upload_session(&mut server, "/upload/session/2").await;
        let first = server
            .mock("PUT", "/upload/session/2")
            .match_header("content-range", "bytes 0-262143/300000")
            .with_status(308)
            .with_header("range", "bytes=0-262143")
            .expect(1)
            .create_async()
            .await;
        let last = server
            .mock("PUT", "/upload/session/2")
            .match_header("content-range", "bytes 262144-299999/300000")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "big-file"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let mut local = NamedTempFile::new().unwrap();
        local.write_all(&vec![7u8; 300_000]).unwrap();

        let id = chunked_folder(&server).upload_file(local.path(), None).await.unwrap();

        first.assert_async().await;
        last.assert_async().await;
        assert_eq!(id, "big-file");
    }

    fn chunked_folder(server: &ServerGuard) -> FolderNode {
        let config = ClientConfig {
            upload_chunk_size: 256 * 1024,
            ..ClientConfig::default().with_api_root(&server.url())
        };
        let session = DriveSession::new(Arc::new(StaticToken::new("t")), &config);
        FolderNode::new(session, "folder1", "Folder", None)
    }

    #[tokio::test]
    async fn incomplete_reply_without_range_resends_from_start() {
        let mut server = Server::new_async().await;
        mock_upload_session(&mut server, "/upload/session/5").await;
        let dropped = server
            .mock("PUT", "/upload/session/5")
            .match_header("content-range", "bytes 0-262143/300000")
            .with_status(308)
            .expect(1)
            .create_async()
            .await;
        let resent = server
            .mock("PUT", "/upload/session/5")
            .match_header("content-range", "bytes 0-262143/300000")
            .with_status(308)
            .with_header("range", "bytes=0-262143")
            .expect(1)
            .create_async()
            .await;
        let last = server
            .mock("PUT", "/upload/session/5")
            .match_header("content-range", "bytes 262144-299999/300000")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "complete"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let mut local = NamedTempFile::new().unwrap();
        local.write_all(&vec![1u8; 300_000]).unwrap();

        let id = chunked_folder(&server).upload_file(local.path(), None).await.unwrap();

        dropped.assert_async().await;
        resent.assert_async().await;
        last.assert_async().await;
        assert_eq!(id, "complete");
    }

    #[tokio::test]
    async fn upload_fails_when_no_bytes_are_ever_committed() {
        let mut server = Server::new_async().await;
        mock_upload_session(&mut server, "/upload/session/6").await;
        let puts = server
            .mock("PUT", "/upload/session/6")
            .with_status(308)
            .expect(3)
            .create_async()
            .await;

        let mut local = NamedTempFile::new().unwrap();
        local.write_all(&vec![1u8; 300_000]).unwrap();

        let err = chunked_folder(&server).upload_file(local.path(), None).await.unwrap_err();

        puts.assert_async().await;
        assert!(err.is_remote());
        assert!(matches!(err, WorkspaceError::UploadStalled { offset: 0 }));
    }

    #[tokio::test]
    async fn upload_files_from_directory_skips_subdirectories() {
        let mut server = Server::new_async().await;
        mock_upload_session(&mut server, "/upload/session/3").await;
        let put = server
            .mock("PUT", "/upload/session/3")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "uploaded"}).to_string())
            .expect(2)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "bee").unwrap();
        std::fs::write(dir.path().join("a.txt"), "ay").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.txt"), "sea").unwrap();

        let folder = FolderNode::new(session(&server), "folder1", "Folder", None);
        let results = folder.upload_files_from_directory(dir.path()).await.unwrap();

        put.assert_async().await;
        let names: Vec<String> = results
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert!(results.iter().all(|(_, r)| r.as_deref().ok() == Some("uploaded")));
    }

    #[tokio::test]
    async fn upload_files_continues_past_failures() {
        let mut server = Server::new_async().await;
        mock_upload_session(&mut server, "/upload/session/4").await;
        server
            .mock("PUT", "/upload/session/4")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "ok"}).to_string())
            .create_async()
            .await;

        let mut local = NamedTempFile::new().unwrap();
        local.write_all(b"data").unwrap();

        let folder = FolderNode::new(session(&server), "folder1", "Folder", None);
        let paths = vec![
            std::path::PathBuf::from("/nonexistent/missing.txt"),
            local.path().to_path_buf(),
        ];
        let results = folder.upload_files(&paths).await;

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(WorkspaceError::IoError(_))));
        assert_eq!(results[1].as_deref().unwrap(), "ok");
    }
}

mod moving {
    use super::*;

    #[tokio::test]
    async fn move_swaps_parents() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drive/v3/files/file1")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "file1", "name": "doc", "parents": ["src"]}).to_string())
            .create_async()
            .await;
        let update = server
            .mock("PATCH", "/drive/v3/files/file1")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("addParents".into(), "dst".into()),
                Matcher::UrlEncoded("removeParents".into(), "src".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "file1", "parents": ["dst"]}).to_string())
            .create_async()
            .await;

        let source = FolderNode::new(session(&server), "src", "Source", None);
        let destination = FolderNode::new(session(&server), "dst", "Destination", None);

        let parents = source.move_file_from_folder("file1", &destination).await.unwrap();

        update.assert_async().await;
        assert_eq!(parents, vec!["dst"]);
    }

    #[tokio::test]
    async fn move_rejects_file_outside_folder() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drive/v3/files/file1")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "file1", "parents": ["elsewhere"]}).to_string())
            .create_async()
            .await;
        let update = server
            .mock("PATCH", "/drive/v3/files/file1")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let source = FolderNode::new(session(&server), "src", "Source", None);
        let destination = FolderNode::new(session(&server), "dst", "Destination", None);

        let err = source.move_file_from_folder("file1", &destination).await.unwrap_err();

        update.assert_async().await;
        assert!(!err.is_remote());
        match err {
            WorkspaceError::NotAParent { file_id, folder_id } => {
                assert_eq!(file_id, "file1");
                assert_eq!(folder_id, "src");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

mod subfolders {
    use super::*;

    #[tokio::test]
    async fn create_subfolder_replaces_same_name_child() {
        let mut server = Server::new_async().await;
        mock_subfolders(&mut server, "root", &[("old", "reports")]).await;
        mock_subfolders(&mut server, "old", &[]).await;
        let create = server
            .mock("POST", "/drive/v3/files")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "name": "reports",
                "mimeType": FOLDER_MIME_TYPE,
                "parents": ["root"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "new"}).to_string())
            .create_async()
            .await;

        let mut root = FolderNode::open(session(&server), "root", "Root").await.unwrap();
        assert_eq!(root.child("reports").unwrap().id(), "old");

        let created = root.create_subfolder("reports").await.unwrap();
        assert_eq!(created.id(), "new");
        assert_eq!(created.parent_id(), Some("root"));

        create.assert_async().await;
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.child("reports").unwrap().id(), "new");
    }

    #[tokio::test]
    async fn create_subfolder_failure_leaves_children_untouched() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("backend error")
            .create_async()
            .await;

        let mut root = FolderNode::new(session(&server), "root", "Root", None);
        let err = root.create_subfolder("x").await.unwrap_err();

        assert!(matches!(err, WorkspaceError::ApiError { status: 500, .. }));
        assert!(root.children().is_empty());
    }
}
