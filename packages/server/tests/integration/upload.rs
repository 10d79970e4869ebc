use std::sync::Arc;

use sea_orm::EntityTrait;

use dedupe_server::entity::content_blob;
use dedupe_server::services::{ServiceError, UploadRequest};

use crate::common::{TestApp, routes};

mod upload_file {
    use super::*;

    #[tokio::test]
    async fn first_upload_stores_content() {
        let app = TestApp::spawn().await;

        let res = app
            .upload_as("a.txt", b"abc", Some("text/plain"))
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["is_duplicate"], false);
        assert_eq!(res.body["storage_saved"], 0);
        assert_eq!(res.body["file"]["reference_count"], 1);
        assert_eq!(res.body["file"]["original_filename"], "a.txt");
        assert_eq!(res.body["file"]["file_type"], "text/plain");
        assert_eq!(res.body["file"]["size"], 3);
        assert_eq!(
            res.body["file"]["content_hash"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let id = res.file_id();
        assert_eq!(
            res.body["file"]["download_url"],
            format!("/api/v1/files/{id}/content")
        );
        assert_eq!(app.stored_blob_count().await, 1);
    }

    #[tokio::test]
    async fn identical_content_is_shared() {
        let app = TestApp::spawn().await;

        let first = app.upload("a.txt", b"abc").await;
        let second = app.upload("b.txt", b"abc").await;

        assert_eq!(second.status, 201, "{}", second.text);
        assert_eq!(second.body["is_duplicate"], true);
        assert_eq!(second.body["storage_saved"], 3);
        assert_eq!(second.body["file"]["reference_count"], 2);
        assert_eq!(second.body["file"]["original_filename"], "b.txt");
        assert_ne!(first.file_id(), second.file_id());
        assert_eq!(
            first.body["file"]["content_hash"],
            second.body["file"]["content_hash"]
        );

        assert_eq!(app.stored_blob_count().await, 1);
        let blobs = content_blob::Entity::find().all(&app.db).await.unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].reference_count, 2);
    }

    #[tokio::test]
    async fn media_type_is_guessed_when_not_declared() {
        let app = TestApp::spawn().await;

        let res = app
            .upload_as("photo.png", b"\x89PNG fake", Some("application/octet-stream"))
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["file"]["file_type"], "image/png");
    }

    #[tokio::test]
    async fn dotfile_names_accepted() {
        let app = TestApp::spawn().await;

        let res = app.upload(".gitignore", b"target/\n").await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["file"]["original_filename"], ".gitignore");
    }

    #[tokio::test]
    async fn empty_file_rejected() {
        let app = TestApp::spawn().await;

        let res = app.upload("empty.txt", b"").await;

        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
        assert_eq!(app.stored_blob_count().await, 0);
    }

    #[tokio::test]
    async fn oversized_file_rejected() {
        let app = TestApp::spawn_with(|config| config.storage.max_upload_size = 16).await;

        let res = app.upload("big.bin", &[7u8; 64]).await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
        assert_eq!(app.stored_blob_count().await, 0);
        let blobs = content_blob::Entity::find().all(&app.db).await.unwrap();
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn missing_file_field_rejected() {
        let app = TestApp::spawn().await;

        let form = reqwest::multipart::Form::new().text("other", "value");
        let res = app
            .client
            .post(format!("http://{}{}", app.addr, routes::FILES))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(res.status().as_u16(), 400);
    }
}

mod upload_service {
    use super::*;

    fn request(filename: &str) -> UploadRequest {
        UploadRequest {
            filename: filename.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn path_like_filename_rejected() {
        let app = TestApp::spawn().await;

        for name in ["../etc/passwd", "dir/file.txt", "a\\b.txt", "   "] {
            let err = app
                .state
                .dedup
                .upload(&b"abc"[..], request(name), 1024)
                .await
                .unwrap_err();
            assert!(
                matches!(err, ServiceError::Validation(_)),
                "{name:?} gave {err:?}"
            );
        }
        assert_eq!(app.stored_blob_count().await, 0);
    }

    #[tokio::test]
    async fn startup_purge_clears_leftover_spool_files() {
        let app = TestApp::spawn().await;
        let spool = app.state.config.storage.root.join(".spool");
        tokio::fs::create_dir_all(&spool).await.unwrap();
        tokio::fs::write(spool.join("upload-left-by-crash"), b"partial")
            .await
            .unwrap();
        tokio::fs::write(spool.join("keep.me"), b"unrelated")
            .await
            .unwrap();

        let purged = app.state.dedup.purge_spool().await.unwrap();

        assert_eq!(purged, 1);
        assert!(!spool.join("upload-left-by-crash").exists());
        assert!(spool.join("keep.me").exists());
        assert_eq!(app.state.dedup.purge_spool().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn declared_size_checked_before_reading() {
        let app = TestApp::spawn().await;

        let err = app
            .state
            .dedup
            .upload(
                &b"abc"[..],
                UploadRequest {
                    filename: "a.txt".into(),
                    declared_type: None,
                    declared_size: Some(2048),
                },
                1024,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn concurrent_identical_uploads_share_one_blob() {
        const UPLOADS: usize = 8;
        let app = TestApp::spawn().await;
        let dedup = Arc::clone(&app.state.dedup);

        let tasks: Vec<_> = (0..UPLOADS)
            .map(|i| {
                let dedup = Arc::clone(&dedup);
                tokio::spawn(async move {
                    dedup
                        .upload(&b"same bytes"[..], request(&format!("copy-{i}.txt")), 1024)
                        .await
                })
            })
            .collect();

        let mut duplicates = 0;
        for task in tasks {
            let outcome = task.await.unwrap().expect("upload should succeed");
            if outcome.is_duplicate {
                duplicates += 1;
            }
        }
        assert_eq!(duplicates, UPLOADS - 1);

        let blobs = content_blob::Entity::find().all(&app.db).await.unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].reference_count, UPLOADS as i32);
        assert_eq!(app.stored_blob_count().await, 1);
    }
}

mod download_file {
    use super::*;

    #[tokio::test]
    async fn returns_original_bytes() {
        let app = TestApp::spawn().await;
        let id = app.upload_ok("hello.txt", b"hello world").await;

        let res = app
            .client
            .get(format!("http://{}{}", app.addr, routes::file_content(&id)))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status().as_u16(), 200);
        let disposition = res.headers()["content-disposition"].to_str().unwrap();
        assert!(disposition.contains("hello.txt"), "{disposition}");
        assert!(res.headers().contains_key("etag"));
        assert_eq!(res.bytes().await.unwrap().as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn duplicate_download_uses_shared_content() {
        let app = TestApp::spawn().await;
        app.upload_ok("one.txt", b"shared").await;
        let second = app.upload_ok("two.txt", b"shared").await;

        let res = app
            .client
            .get(format!("http://{}{}", app.addr, routes::file_content(&second)))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status().as_u16(), 200);
        let disposition = res.headers()["content-disposition"].to_str().unwrap();
        assert!(disposition.contains("two.txt"), "{disposition}");
        assert_eq!(res.bytes().await.unwrap().as_ref(), b"shared");
    }

    #[tokio::test]
    async fn matching_etag_returns_not_modified() {
        let app = TestApp::spawn().await;
        let id = app.upload_ok("hello.txt", b"hello world").await;
        let path = routes::file_content(&id);

        let first = app.get_with_header(&path, "accept", "*/*").await;
        let etag = first.headers()["etag"].to_str().unwrap().to_string();

        let second = app.get_with_header(&path, "if-none-match", &etag).await;
        assert_eq!(second.status().as_u16(), 304);
    }

    #[tokio::test]
    async fn unknown_id_not_found() {
        let app = TestApp::spawn().await;

        let res = app
            .get(&routes::file_content("01936f0e-1234-7abc-8000-000000000001"))
            .await;
        assert_eq!(res.status, 404);
        assert_eq!(res.error_code(), "NOT_FOUND");
    }
}

mod get_file {
    use super::*;

    #[tokio::test]
    async fn reports_live_reference_count() {
        let app = TestApp::spawn().await;
        let id = app.upload_ok("a.txt", b"abc").await;
        app.upload_ok("b.txt", b"abc").await;

        let res = app.get(&routes::file(&id)).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["id"], id.as_str());
        assert_eq!(res.body["is_duplicate"], false);
        assert_eq!(res.body["reference_count"], 2);
    }

    #[tokio::test]
    async fn malformed_id_rejected() {
        let app = TestApp::spawn().await;

        let res = app.get(&routes::file("not-a-uuid")).await;
        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
    }
}
