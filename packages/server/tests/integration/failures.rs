use std::sync::Arc;

use ::common::storage::{
    BlobStore, BoxReader, ContentHash, FilesystemBlobStore, StorageError,
};
use async_trait::async_trait;
use sea_orm::{EntityTrait, PaginatorTrait};

use dedupe_server::config::DedupConfig;
use dedupe_server::entity::{content_blob, file_reference};
use dedupe_server::services::{DedupService, HashLocks, ServiceError, UploadRequest};

use crate::common::TestApp;

#[derive(Clone, Copy)]
enum Fault {
    Put,
    Exists,
    WrongDigest,
}

/// Filesystem store that fails one operation on demand.
struct FaultyStore {
    inner: Arc<FilesystemBlobStore>,
    fault: Fault,
}

fn injected() -> StorageError {
    StorageError::Io(std::io::Error::other("injected failure"))
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn put_stream(&self, reader: BoxReader) -> Result<ContentHash, StorageError> {
        match self.fault {
            Fault::Put => Err(injected()),
            Fault::WrongDigest => {
                self.inner.put_stream(reader).await?;
                Ok(ContentHash::compute(b"something else"))
            }
            Fault::Exists => self.inner.put_stream(reader).await,
        }
    }

    async fn get_stream(&self, hash: &ContentHash) -> Result<BoxReader, StorageError> {
        self.inner.get_stream(hash).await
    }

    async fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        match self.fault {
            Fault::Exists => Err(injected()),
            _ => self.inner.exists(hash).await,
        }
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        self.inner.delete(hash).await
    }

    async fn size(&self, hash: &ContentHash) -> Result<u64, StorageError> {
        self.inner.size(hash).await
    }

    async fn list(&self) -> Result<Vec<ContentHash>, StorageError> {
        self.inner.list().await
    }
}

async fn upload_through(app: &TestApp, fault: Fault) -> Result<(), ServiceError> {
    let spool = tempfile::tempdir().unwrap();
    let store = FaultyStore {
        inner: app.blobs.clone(),
        fault,
    };
    let service = DedupService::new(
        app.db.clone(),
        Arc::new(store),
        Arc::new(HashLocks::default()),
        &DedupConfig::default(),
    )
    .with_spool_dir(spool.path().to_path_buf());

    let request = UploadRequest {
        filename: "a.txt".into(),
        declared_type: Some("text/plain".into()),
        declared_size: None,
    };
    service
        .upload(&b"abc"[..], request, 1024)
        .await
        .map(|_| ())
}

async fn assert_nothing_recorded(app: &TestApp) {
    let blobs = content_blob::Entity::find().count(&app.db).await.unwrap();
    let references = file_reference::Entity::find().count(&app.db).await.unwrap();
    assert_eq!(blobs, 0);
    assert_eq!(references, 0);
    assert_eq!(app.stored_blob_count().await, 0);
}

#[tokio::test]
async fn failed_write_rolls_back() {
    let app = TestApp::spawn().await;

    let err = upload_through(&app, Fault::Put).await.unwrap_err();

    assert!(matches!(err, ServiceError::StorageIo(_)), "{err:?}");
    assert_nothing_recorded(&app).await;
}

#[tokio::test]
async fn failed_existence_check_rolls_back() {
    let app = TestApp::spawn().await;

    let err = upload_through(&app, Fault::Exists).await.unwrap_err();

    assert!(matches!(err, ServiceError::StorageIo(_)), "{err:?}");
    assert_nothing_recorded(&app).await;
}

#[tokio::test]
async fn digest_mismatch_discards_placed_bytes() {
    let app = TestApp::spawn().await;

    let err = upload_through(&app, Fault::WrongDigest).await.unwrap_err();

    assert!(matches!(err, ServiceError::StorageIo(_)), "{err:?}");
    assert_nothing_recorded(&app).await;
}

#[tokio::test]
async fn existing_content_survives_a_failed_upload_elsewhere() {
    let app = TestApp::spawn().await;
    app.upload_ok("kept.txt", b"kept").await;

    let err = upload_through(&app, Fault::Put).await.unwrap_err();

    assert!(matches!(err, ServiceError::StorageIo(_)), "{err:?}");
    assert_eq!(app.stored_blob_count().await, 1);
    let references = file_reference::Entity::find().count(&app.db).await.unwrap();
    assert_eq!(references, 1);
}
