use ::common::storage::{BlobStore, ContentHash};

use dedupe_server::catalog::Catalog;

use crate::common::{TestApp, routes};

/// Store `bytes` with a blob row whose reference count is already zero.
async fn zero_reference_blob(app: &TestApp, bytes: &[u8]) -> ContentHash {
    let hash = app.blobs.put(bytes).await.unwrap();
    let catalog = Catalog::new(&app.db);
    catalog
        .insert_blob(
            &hash.to_hex(),
            bytes.len() as i64,
            "application/octet-stream",
            hash.locator(),
        )
        .await
        .unwrap();
    assert!(
        catalog
            .swap_reference_count(&hash.to_hex(), 1, 0)
            .await
            .unwrap()
    );
    hash
}

mod report {
    use super::*;

    #[tokio::test]
    async fn consistent_catalog_is_clean() {
        let app = TestApp::spawn().await;
        app.upload_ok("a.txt", b"abc").await;
        app.upload_ok("b.txt", b"abc").await;

        let res = app.get(routes::ORPHANS).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["total"], 0);
        assert!(res.body["zero_reference_blobs"].as_array().unwrap().is_empty());
        assert!(res.body["untracked_entries"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finds_both_kinds() {
        let app = TestApp::spawn().await;
        app.upload_ok("kept.txt", b"kept").await;
        let zero = zero_reference_blob(&app, b"forgotten").await;
        let stray = app.blobs.put(b"stray bytes").await.unwrap();

        let res = app.get(routes::ORPHANS).await;

        assert_eq!(res.body["total"], 2);
        let zero_rows = res.body["zero_reference_blobs"].as_array().unwrap();
        assert_eq!(zero_rows.len(), 1);
        assert_eq!(zero_rows[0]["content_hash"], zero.to_hex());
        assert_eq!(zero_rows[0]["reference_count"], 0);

        let untracked = res.body["untracked_entries"].as_array().unwrap();
        assert_eq!(untracked.len(), 1);
        assert_eq!(untracked[0]["content_hash"], stray.to_hex());
        assert_eq!(untracked[0]["size"], 11);
    }

    #[tokio::test]
    async fn upload_spool_is_not_reported() {
        let app = TestApp::spawn().await;
        app.upload_ok("a.txt", b"abc").await;
        tokio::fs::create_dir_all(app.state.config.storage.root.join(".spool"))
            .await
            .unwrap();

        let report = app.state.scanner.orphaned_files().await.unwrap();
        assert!(report.is_clean());
    }
}

mod collect {
    use super::*;

    #[tokio::test]
    async fn frees_zero_reference_blobs_only() {
        let app = TestApp::spawn().await;
        app.upload_ok("kept.txt", b"kept").await;
        let zero = zero_reference_blob(&app, b"forgotten").await;
        let stray = app.blobs.put(b"stray bytes").await.unwrap();

        let res = app.post_empty(routes::COLLECT_ORPHANS).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["collected"], serde_json::json!([zero.to_hex()]));
        assert_eq!(res.body["storage_freed"], 9);

        assert!(!app.blobs.exists(&zero).await.unwrap());
        assert!(app.blobs.exists(&stray).await.unwrap());
        assert!(
            Catalog::new(&app.db)
                .find_blob(&zero.to_hex())
                .await
                .unwrap()
                .is_none()
        );

        let after = app.get(routes::ORPHANS).await;
        assert_eq!(after.body["total"], 1);
        assert!(after.body["zero_reference_blobs"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn nothing_to_collect() {
        let app = TestApp::spawn().await;
        app.upload_ok("a.txt", b"abc").await;

        let outcome = app.state.scanner.collect_garbage().await.unwrap();

        assert!(outcome.collected.is_empty());
        assert_eq!(outcome.storage_freed, 0);
        assert_eq!(app.stored_blob_count().await, 1);
    }
}
