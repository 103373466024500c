#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drive_backend::config::UploadConfig;
use drive_backend::entities::users;
use drive_backend::infrastructure::database;
use drive_backend::services::pipeline::IngestionPipeline;
use drive_backend::services::remote_store::{
    RemoteListing, RemoteObject, RemoteStore, ResourceKind, UploadOptions,
};
use drive_backend::services::repository::{
    FileChanges, FileRecord, FileRepository, FileStats, ListFilter, Page, SeaOrmFileRepository,
};
use drive_backend::services::stage::{DiskStage, StageError, StagedFile, TempStage};
use image::{DynamicImage, ImageFormat, RgbImage};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, DbErr, Set};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncRead;
use uuid::Uuid;

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

pub async fn create_user(db: &DatabaseConnection, id: &str) {
    users::ActiveModel {
        id: Set(id.to_string()),
        name: Set(format!("user {}", id)),
        email: Set(format!("{}@example.com", id)),
        password_hash: Set("unused".to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .unwrap();
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 90])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

/// In-memory remote store with failure injection.
#[derive(Default)]
pub struct MockRemoteStore {
    pub objects: Mutex<HashMap<String, StoredObject>>,
    /// Upload call numbers (0-based) that fail
    pub fail_uploads: Mutex<HashSet<usize>>,
    pub fail_deletes: AtomicBool,
    pub upload_delay: Mutex<Option<Duration>>,
    pub upload_calls: AtomicUsize,
    pub delete_calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Declared content types in upload order
    pub uploaded_types: Mutex<Vec<String>>,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upload_call(&self, n: usize) {
        self.fail_uploads.lock().unwrap().insert(n);
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    pub fn insert_object(&self, key: &str, last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes: Vec::new(),
                content_type: "application/octet-stream".to_string(),
                last_modified,
            },
        );
    }

    pub fn keys(&self) -> HashSet<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn upload(&self, local_path: &Path, opts: &UploadOptions) -> anyhow::Result<RemoteObject> {
        let call = self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // The local file must still exist while the upload runs
        let read = tokio::fs::read(local_path).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let bytes = read?;

        self.uploaded_types
            .lock()
            .unwrap()
            .push(opts.content_type.clone());

        if self.fail_uploads.lock().unwrap().contains(&call) {
            anyhow::bail!("injected upload failure on call {}", call);
        }

        let object_key = match &opts.extension {
            Some(ext) => format!("drive/{}.{}", Uuid::new_v4(), ext),
            None => format!("drive/{}", Uuid::new_v4()),
        };
        self.objects.lock().unwrap().insert(
            object_key.clone(),
            StoredObject {
                bytes,
                content_type: opts.content_type.clone(),
                last_modified: Utc::now(),
            },
        );

        Ok(RemoteObject {
            url: format!("https://cdn.test/{}", object_key),
            object_key,
            resource_kind: ResourceKind::for_mime(&opts.content_type),
        })
    }

    async fn delete(&self, object_key: &str) -> anyhow::Result<()> {
        self.delete_calls.lock().unwrap().push(object_key.to_string());
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("injected delete failure for {}", object_key);
        }
        self.objects.lock().unwrap().remove(object_key);
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<RemoteListing>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(k, o)| RemoteListing {
                object_key: k.clone(),
                last_modified: Some(o.last_modified),
            })
            .collect())
    }
}

/// Disk stage that records every path it hands out and every release.
pub struct RecordingStage {
    inner: DiskStage,
    created: Mutex<Vec<PathBuf>>,
    releases: Mutex<HashMap<PathBuf, usize>>,
}

impl RecordingStage {
    pub async fn new(dir: &Path, max_file_size: usize) -> Self {
        Self {
            inner: DiskStage::new(dir, max_file_size).await.unwrap(),
            created: Mutex::new(Vec::new()),
            releases: Mutex::new(HashMap::new()),
        }
    }

    pub fn created(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }

    pub fn release_count(&self, path: &Path) -> usize {
        self.releases.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Every path handed out was released exactly once and nothing is left on disk.
    pub fn assert_no_leaks(&self) {
        for path in self.created() {
            assert_eq!(
                self.release_count(&path),
                1,
                "{} released {} time(s)",
                path.display(),
                self.release_count(&path)
            );
            assert!(!path.exists(), "{} still on disk", path.display());
        }
        let left: Vec<_> = std::fs::read_dir(self.inner.dir()).unwrap().collect();
        assert!(left.is_empty(), "stage dir not empty: {:?}", left);
    }
}

#[async_trait]
impl TempStage for RecordingStage {
    async fn stage<'a>(
        &self,
        request_id: &str,
        declared_name: &str,
        declared_mime_type: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StagedFile, StageError> {
        let staged = self
            .inner
            .stage(request_id, declared_name, declared_mime_type, reader)
            .await?;
        self.created.lock().unwrap().push(staged.local_path.clone());
        Ok(staged)
    }

    fn allocate(&self, extension: &str) -> PathBuf {
        let path = self.inner.allocate(extension);
        self.created.lock().unwrap().push(path.clone());
        path
    }

    async fn release(&self, path: &Path) {
        *self
            .releases
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default() += 1;
        self.inner.release(path).await;
    }

    async fn sweep(&self, max_age: Duration) -> anyhow::Result<usize> {
        self.inner.sweep(max_age).await
    }
}

/// Repository wrapper whose writes can be made to fail.
pub struct FailingRepository {
    inner: SeaOrmFileRepository,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
}

impl FailingRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            inner: SeaOrmFileRepository::new(db),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FileRepository for FailingRepository {
    async fn create(
        &self,
        filename: &str,
        url: &str,
        object_key: &str,
        owner_id: &str,
    ) -> Result<FileRecord, DbErr> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DbErr::Custom("injected create failure".to_string()));
        }
        self.inner.create(filename, url, object_key, owner_id).await
    }

    async fn find_owned(&self, id: &str, owner_id: &str) -> Result<Option<FileRecord>, DbErr> {
        self.inner.find_owned(id, owner_id).await
    }

    async fn update(&self, id: &str, changes: FileChanges) -> Result<FileRecord, DbErr> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(DbErr::Custom("injected update failure".to_string()));
        }
        self.inner.update(id, changes).await
    }

    async fn delete(&self, id: &str) -> Result<(), DbErr> {
        self.inner.delete(id).await
    }

    async fn list(
        &self,
        owner_id: &str,
        filter: &ListFilter,
        page: Page,
    ) -> Result<(Vec<FileRecord>, u64), DbErr> {
        self.inner.list(owner_id, filter, page).await
    }

    async fn stats(&self, owner_id: &str) -> Result<FileStats, DbErr> {
        self.inner.stats(owner_id).await
    }

    async fn object_keys_present(&self, keys: &[String]) -> Result<HashSet<String>, DbErr> {
        self.inner.object_keys_present(keys).await
    }
}

pub struct Harness {
    pub db: DatabaseConnection,
    pub stage: Arc<RecordingStage>,
    pub remote: Arc<MockRemoteStore>,
    pub repo: Arc<FailingRepository>,
    pub pipeline: Arc<IngestionPipeline>,
    pub config: UploadConfig,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(UploadConfig {
            remote_timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .await
    }

    pub async fn with_config(mut config: UploadConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        config.stage_dir = dir.path().to_path_buf();

        let db = setup_test_db().await;
        create_user(&db, "owner-1").await;
        create_user(&db, "owner-2").await;

        let stage = Arc::new(RecordingStage::new(dir.path(), config.max_file_size).await);
        let remote = Arc::new(MockRemoteStore::new());
        let repo = Arc::new(FailingRepository::new(db.clone()));
        let pipeline = Arc::new(IngestionPipeline::new(
            &config,
            stage.clone(),
            remote.clone(),
            repo.clone(),
        ));

        Self {
            db,
            stage,
            remote,
            repo,
            pipeline,
            config,
            _dir: dir,
        }
    }

    pub async fn stage_bytes(&self, name: &str, mime: &str, bytes: &[u8]) -> StagedFile {
        self.stage
            .stage("req-test", name, mime, Box::new(Cursor::new(bytes.to_vec())))
            .await
            .unwrap()
    }
}
