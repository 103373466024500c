use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Video,
    Raw,
}

impl ResourceKind {
    pub fn for_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            ResourceKind::Image
        } else if mime.starts_with("video/") || mime.starts_with("audio/") {
            ResourceKind::Video
        } else {
            ResourceKind::Raw
        }
    }
}

/// A durably stored blob. `object_key` is what `delete` takes.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub url: String,
    pub object_key: String,
    pub resource_kind: ResourceKind,
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub content_type: String,
    /// Extension of the stored object, without the dot
    pub extension: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteListing {
    pub object_key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upload(&self, local_path: &Path, opts: &UploadOptions) -> Result<RemoteObject>;
    async fn delete(&self, object_key: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<RemoteListing>>;
}

pub struct S3RemoteStore {
    client: Client,
    bucket: String,
    folder: String,
    public_base_url: String,
}

impl S3RemoteStore {
    pub fn new(client: Client, bucket: String, folder: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            folder,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn object_key(&self, extension: Option<&str>) -> String {
        match extension {
            Some(ext) if !ext.is_empty() => {
                format!("{}/{}.{}", self.folder, Uuid::new_v4(), ext.to_lowercase())
            }
            _ => format!("{}/{}", self.folder, Uuid::new_v4()),
        }
    }
}

#[async_trait]
impl RemoteStore for S3RemoteStore {
    async fn upload(&self, local_path: &Path, opts: &UploadOptions) -> Result<RemoteObject> {
        let key = self.object_key(opts.extension.as_deref());
        let body = ByteStream::from_path(local_path).await?;

        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&opts.content_type)
            .body(body)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 put_object failed: bucket={}, key={}, error={:?}",
                self.bucket,
                key,
                e
            );
            return Err(e.into());
        }

        Ok(RemoteObject {
            url: format!("{}/{}", self.public_base_url, key),
            object_key: key,
            resource_kind: ResourceKind::for_mime(&opts.content_type),
        })
    }

    async fn delete(&self, object_key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteListing>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;
        let prefix = format!("{}/", self.folder);

        loop {
            let res = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(continuation_token)
                .send()
                .await?;

            for object in res.contents.unwrap_or_default() {
                if let Some(key) = object.key {
                    let last_modified = object
                        .last_modified
                        .and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()));
                    objects.push(RemoteListing {
                        object_key: key,
                        last_modified,
                    });
                }
            }

            if res.is_truncated.unwrap_or(false) {
                continuation_token = res.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_for_mime() {
        assert_eq!(ResourceKind::for_mime("image/webp"), ResourceKind::Image);
        assert_eq!(ResourceKind::for_mime("video/mp4"), ResourceKind::Video);
        assert_eq!(ResourceKind::for_mime("audio/mpeg"), ResourceKind::Video);
        assert_eq!(ResourceKind::for_mime("application/pdf"), ResourceKind::Raw);
    }
}
