//! Artifact storage service.
//!
//! S3-compatible object storage behind the [`ArtifactStore`] trait.
//!
//! ## Operations
//!
//! - `upload` - Store an object and return its public URL
//! - `exists` - Head an object; absence is `Ok(false)`, not an error
//!
//! The public URL is `{public_url_prefix}/{folder}/{path}`; the store itself
//! is addressed with the folder as bucket and the path as key.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use crate::config::Environment;
use crate::error::{Error, Result};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `body` under `folder/path` and return the public URL.
    async fn upload(
        &self,
        folder: &str,
        path: &str,
        body: Bytes,
        content_type: &str,
        public_url_prefix: &str,
    ) -> Result<String>;

    /// Whether `folder/path` currently exists in the store.
    async fn exists(&self, folder: &str, path: &str) -> Result<bool>;
}

/// S3 implementation with a custom endpoint and path-style addressing, so it
/// works against AWS, MinIO and other compatible stores alike.
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
}

impl S3ArtifactStore {
    pub fn new(env: &Environment) -> Self {
        let credentials = Credentials::new(
            env.aws_access_key_id.clone(),
            env.aws_secret_access_key.clone(),
            None,
            None,
            "environment",
        );

        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(env.aws_region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(env.aws_s3_endpoint_url.clone())
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn upload(
        &self,
        folder: &str,
        path: &str,
        body: Bytes,
        content_type: &str,
        public_url_prefix: &str,
    ) -> Result<String> {
        self.client
            .put_object()
            .bucket(folder)
            .key(path)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| Error::storage(format!("error uploading {folder}/{path}: {err}")))?;

        Ok(format!("{public_url_prefix}/{folder}/{path}"))
    }

    async fn exists(&self, folder: &str, path: &str) -> Result<bool> {
        match self.client.head_object().bucket(folder).key(path).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    return Ok(false);
                }
                Err(Error::storage(format!(
                    "error checking {folder}/{path}: {service_err}"
                )))
            }
        }
    }
}
