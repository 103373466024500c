use crate::config::StorageConfig;
use crate::services::remote_store::S3RemoteStore;
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &StorageConfig) -> Arc<S3RemoteStore> {
    info!(
        "☁️  S3 Storage: {} (Bucket: {}, Folder: {})",
        config.endpoint, config.bucket, config.folder
    );

    let aws_config = aws_config::from_env()
        .endpoint_url(&config.endpoint)
        .region(Region::new(config.region.clone()))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&config.bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", config.bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", config.bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&config.bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", config.bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", config.bucket);
            }
        }
    }

    Arc::new(S3RemoteStore::new(
        s3_client,
        config.bucket.clone(),
        config.folder.clone(),
        config.public_base_url.clone(),
    ))
}
