use async_trait::async_trait;
use aws_sdk_s3 as s3;
use axum::body::Bytes;
use s3::error::DisplayErrorContext;
use s3::operation::create_bucket::CreateBucketError;
use s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

// 1. StorageService Contract
/// StorageService
///
/// Abstract contract for where uploaded photos end up. The handler only sees this
/// trait, so the disk, S3 and mock backends are interchangeable.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Prepares the backend (creates the bucket or directory). Safe to call repeatedly.
    async fn ensure_bucket_exists(&self);

    /// Persists `bytes` under `key` and returns the URL clients use to fetch it.
    ///
    /// # Arguments
    /// * `key`: object key built by [`photo_object_key`].
    /// * `content_type`: MIME type reported by the client for the part.
    async fn store(
        &self,
        key: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<String, StorageError>;
}

/// photo_object_key
///
/// `restaurants/<id>/<uuid>.<ext>`. Only the extension of the client file name
/// survives, and only if it is short and alphanumeric.
pub fn photo_object_key(restaurant_id: i64, file_name: &str) -> String {
    let extension = Path::new(file_name)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string());
    format!("restaurants/{}/{}.{}", restaurant_id, Uuid::new_v4(), extension)
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`, empty segments) from a key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 2. Local Disk Implementation (Env::Local)
/// LocalDiskStorage
///
/// Writes photos below `root`; the router serves that directory at `/uploads`.
#[derive(Clone)]
pub struct LocalDiskStorage {
    root: PathBuf,
    public_prefix: String,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_prefix: "/uploads".to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageService for LocalDiskStorage {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            tracing::error!(error = %e, root = %self.root.display(), "cannot create upload directory");
        }
    }

    async fn store(
        &self,
        key: &str,
        _content_type: &str,
        bytes: Bytes,
    ) -> Result<String, StorageError> {
        let key = sanitize_key(key);
        if key.is_empty() {
            return Err(StorageError::Backend("empty object key".to_string()));
        }
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        Ok(format!("{}/{}", self.public_prefix, key))
    }
}

// 3. The S3 Implementation (Env::Production)
/// S3StorageClient
///
/// AWS SDK client for any S3-compatible endpoint (MinIO, managed buckets).
/// `force_path_style(true)` is required for MinIO.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    endpoint: String,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket_name: bucket.to_string(),
        }
    }

    /// Path-style public URL of an object.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket_name, key)
    }
}

/// True when CreateBucket failed only because the bucket is already there.
pub fn bucket_already_present(err: &CreateBucketError) -> bool {
    err.is_bucket_already_owned_by_you() || err.is_bucket_already_exists()
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// ensure_bucket_exists
    ///
    /// "Already exists" is the normal outcome after the first start; any other
    /// failure is logged and startup continues.
    async fn ensure_bucket_exists(&self) {
        let result = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;
        if let Err(e) = result {
            if e.as_service_error().is_some_and(bucket_already_present) {
                tracing::debug!(bucket = %self.bucket_name, "bucket already exists");
            } else {
                tracing::warn!(bucket = %self.bucket_name, error = %DisplayErrorContext(&e), "could not create bucket");
            }
        }
    }

    async fn store(
        &self,
        key: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<String, StorageError> {
        let key = sanitize_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(self.object_url(&key))
    }
}

// 4. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory stand-in used by the test suite; records nothing, returns
/// deterministic URLs.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn store(
        &self,
        key: &str,
        _content_type: &str,
        _bytes: Bytes,
    ) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        Ok(format!("http://localhost:9000/mock-bucket/{}", sanitize_key(key)))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
