use std::net::SocketAddr;
use std::sync::Arc;

use ::common::storage::FilesystemBlobStore;
use reqwest::Client;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tempfile::TempDir;

use dedupe_server::config::{
    AppConfig, CorsConfig, DatabaseConfig, DedupConfig, ReconcileConfig, SearchConfig,
    ServerConfig, StorageConfig,
};
use dedupe_server::state::AppState;

/// Upload cap used unless a test overrides it.
pub const TEST_MAX_UPLOAD: u64 = 1024 * 1024;

pub mod routes {
    pub const FILES: &str = "/api/v1/files";
    pub const SEARCH: &str = "/api/v1/files/search";
    pub const FILE_TYPES: &str = "/api/v1/files/file-types";
    pub const DUPLICATES: &str = "/api/v1/files/duplicates";
    pub const BULK_DELETE: &str = "/api/v1/files/bulk-delete";
    pub const STATS: &str = "/api/v1/stats";
    pub const DETAILED_STATS: &str = "/api/v1/stats/detailed";
    pub const ORPHANS: &str = "/api/v1/stats/orphans";
    pub const COLLECT_ORPHANS: &str = "/api/v1/stats/orphans/collect";

    pub fn file(id: &str) -> String {
        format!("/api/v1/files/{id}")
    }

    pub fn file_content(id: &str) -> String {
        format!("/api/v1/files/{id}/content")
    }
}

/// A running test server over a throwaway catalog and blob root.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub state: AppState,
    pub blobs: Arc<FilesystemBlobStore>,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("catalog.db").display()
        );

        let mut config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig::default(),
            },
            database: DatabaseConfig::new(db_url),
            storage: StorageConfig {
                root: dir.path().join("blobs"),
                max_upload_size: TEST_MAX_UPLOAD,
            },
            search: SearchConfig::default(),
            dedup: DedupConfig::default(),
            reconcile: ReconcileConfig::default(),
        };
        customize(&mut config);

        let db = dedupe_server::database::init_db(&config.database)
            .await
            .expect("Failed to initialize database");
        dedupe_server::schema::ensure_indexes(&db)
            .await
            .expect("Failed to create indexes");

        let blobs = Arc::new(
            FilesystemBlobStore::new(config.storage.root.clone(), config.storage.max_upload_size)
                .await
                .expect("Failed to open blob store"),
        );

        let state = AppState::new(db.clone(), config, blobs.clone());
        let app = dedupe_server::build_router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            state,
            blobs,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_header(&self, path: &str, name: &str, value: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(name, value)
            .send()
            .await
            .expect("Failed to send GET request")
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_empty(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// Upload `file_bytes` as the `file` multipart field.
    pub async fn upload(&self, file_name: &str, file_bytes: &[u8]) -> TestResponse {
        self.upload_as(file_name, file_bytes, None).await
    }

    pub async fn upload_as(
        &self,
        file_name: &str,
        file_bytes: &[u8],
        mime: Option<&str>,
    ) -> TestResponse {
        let mut part =
            reqwest::multipart::Part::bytes(file_bytes.to_vec()).file_name(file_name.to_string());
        if let Some(mime) = mime {
            part = part.mime_str(mime).expect("Failed to set MIME type");
        }
        let form = reqwest::multipart::Form::new().part("file", part);

        let res = self
            .client
            .post(self.url(routes::FILES))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Upload and return the new file id, asserting success.
    pub async fn upload_ok(&self, file_name: &str, file_bytes: &[u8]) -> String {
        let res = self.upload(file_name, file_bytes).await;
        assert_eq!(res.status, 201, "upload failed: {}", res.text);
        res.file_id()
    }

    /// Number of blobs physically present in the store.
    pub async fn stored_blob_count(&self) -> usize {
        use ::common::storage::BlobStore;
        self.blobs.list().await.expect("Failed to list blobs").len()
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    /// Id of the file in an upload response.
    pub fn file_id(&self) -> String {
        self.body["file"]["id"]
            .as_str()
            .expect("response body should contain 'file.id'")
            .to_string()
    }

    pub fn error_code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}
