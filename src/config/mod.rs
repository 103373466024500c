use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Mime types accepted by the upload pipeline, grouped by category.
pub const DEFAULT_ALLOWED_MIMES: &[&str] = &[
    // Images
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    // Documents
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    // Archives
    "application/zip",
    "application/x-rar-compressed",
    "application/x-7z-compressed",
    // Audio / video
    "video/mp4",
    "video/avi",
    "video/mov",
    "audio/mp3",
    "audio/wav",
    "audio/mpeg",
    // Source text
    "text/html",
    "text/css",
    "text/javascript",
    "application/json",
];

/// Settings for staging, classification, compression and remote calls.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory holding staged uploads and derived assets (default: "uploads")
    pub stage_dir: PathBuf,

    /// Maximum size of a single file in bytes (default: 50 MiB)
    pub max_file_size: usize,

    /// Maximum number of files per upload request (default: 20)
    pub max_files_per_request: usize,

    /// Accepted declared mime types
    pub allowed_mimes: Vec<String>,

    /// Bounding box for compressed images (default: 1920x1080)
    pub image_max_width: u32,
    pub image_max_height: u32,

    /// WebP quality, 0-100 (default: 80)
    pub image_quality: u8,

    /// Upper bound for a single remote upload or delete call (default: 60s)
    pub remote_timeout: Duration,

    /// Number of files of one batch processed at once (default: 1, sequential)
    pub batch_concurrency: usize,

    /// Stage files older than this are swept by the background worker (default: 24h)
    pub stale_stage_age: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            stage_dir: PathBuf::from("uploads"),
            max_file_size: 50 * 1024 * 1024, // 50 MiB
            max_files_per_request: 20,
            allowed_mimes: DEFAULT_ALLOWED_MIMES.iter().map(|m| m.to_string()).collect(),
            image_max_width: 1920,
            image_max_height: 1080,
            image_quality: 80,
            remote_timeout: Duration::from_secs(60),
            batch_concurrency: 1,
            stale_stage_age: Duration::from_secs(24 * 3600),
        }
    }
}

/// S3-compatible object store settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,

    /// Prefix used to build public locators, e.g. "http://localhost:9000/drive"
    pub public_base_url: String,

    /// Key prefix for every uploaded object (default: "drive")
    pub folder: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "drive".to_string(),
            public_base_url: "http://127.0.0.1:9000/drive".to_string(),
            folder: "drive".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Time between two background sweeps (default: 1h)
    pub sweep_interval: Duration,

    /// Remote objects younger than this are never treated as orphans (default: 6h)
    pub orphan_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(3600),
            orphan_grace: Duration::from_secs(6 * 3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub upload: UploadConfig,
    pub storage: StorageConfig,
    pub worker: WorkerConfig,

    /// JWT secret key
    pub jwt_secret: String,

    /// Session lifetime in hours (default: 168, seven days)
    pub token_ttl_hours: i64,

    /// Set the `Secure` flag on the session cookie
    pub secure_cookies: bool,

    /// Allowed CORS origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://drive.db?mode=rwc".to_string(),
            upload: UploadConfig::default(),
            storage: StorageConfig::default(),
            worker: WorkerConfig::default(),
            jwt_secret: "secret".to_string(),
            token_ttl_hours: 24 * 7,
            secure_cookies: false,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Image bound in pixels; zero or garbage falls back to the default.
fn parse_dimension(raw: Option<&str>) -> Option<u32> {
    raw?.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();
        let upload = default.upload;
        let storage = default.storage;
        let worker = default.worker;

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            upload: UploadConfig {
                stage_dir: env::var("STAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(upload.stage_dir),
                max_file_size: parse_var("MAX_FILE_SIZE").unwrap_or(upload.max_file_size),
                max_files_per_request: parse_var("MAX_FILES_PER_REQUEST")
                    .unwrap_or(upload.max_files_per_request),
                allowed_mimes: env::var("ALLOWED_MIMES")
                    .ok()
                    .map(|v| {
                        v.split(',')
                            .map(|s| s.trim().to_lowercase())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or(upload.allowed_mimes),
                image_max_width: parse_dimension(env::var("IMAGE_MAX_WIDTH").ok().as_deref())
                    .unwrap_or(upload.image_max_width),
                image_max_height: parse_dimension(env::var("IMAGE_MAX_HEIGHT").ok().as_deref())
                    .unwrap_or(upload.image_max_height),
                image_quality: parse_var::<u8>("IMAGE_QUALITY")
                    .map(|q| q.min(100))
                    .unwrap_or(upload.image_quality),
                remote_timeout: parse_var("REMOTE_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(upload.remote_timeout),
                batch_concurrency: parse_var::<usize>("BATCH_CONCURRENCY")
                    .map(|n| n.max(1))
                    .unwrap_or(upload.batch_concurrency),
                stale_stage_age: parse_var("STALE_STAGE_AGE_HOURS")
                    .map(|h: u64| Duration::from_secs(h * 3600))
                    .unwrap_or(upload.stale_stage_age),
            },

            storage: StorageConfig {
                endpoint: env::var("S3_ENDPOINT").unwrap_or(storage.endpoint),
                region: env::var("S3_REGION").unwrap_or(storage.region),
                access_key: env::var("S3_ACCESS_KEY").unwrap_or(storage.access_key),
                secret_key: env::var("S3_SECRET_KEY").unwrap_or(storage.secret_key),
                bucket: env::var("S3_BUCKET").unwrap_or(storage.bucket),
                public_base_url: env::var("S3_PUBLIC_BASE_URL")
                    .unwrap_or(storage.public_base_url),
                folder: env::var("S3_FOLDER").unwrap_or(storage.folder),
            },

            worker: WorkerConfig {
                sweep_interval: parse_var("SWEEP_INTERVAL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(worker.sweep_interval),
                orphan_grace: parse_var("ORPHAN_GRACE_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(worker.orphan_grace),
            },

            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),
            token_ttl_hours: parse_var("TOKEN_TTL_HOURS").unwrap_or(default.token_ttl_hours),
            secure_cookies: env::var("SECURE_COOKIES")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.secure_cookies),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Config for local development and tests: in-memory database, short timeouts
    pub fn development() -> Self {
        let mut config = Self::default();
        config.database_url = "sqlite::memory:".to_string();
        config.upload.remote_timeout = Duration::from_secs(5);
        config.worker.orphan_grace = Duration::from_secs(60);
        config
    }
}
