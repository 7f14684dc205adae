//! Blob resolver for the Software Heritage S3 bucket
//!
//! Objects live at `s3://<bucket>/<prefix><blob_id>` and are gzip compressed.
//! The S3 client is injected so tests and alternative endpoints (MinIO, a
//! local mirror) can swap it out.

use super::{decode_text, gunzip, ContentResolver, ResolutionError};
use crate::config::BlobStoreConfig;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    Client,
};
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct S3BlobResolver {
    client: Client,
    bucket: String,
    key_prefix: String,
}

impl S3BlobResolver {
    pub fn new(client: Client, bucket: impl Into<String>, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
        }
    }

    /// Build a client from explicit credentials
    pub fn from_config(config: &BlobStoreConfig) -> Self {
        debug!("Initializing blob resolver with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "stackfetch-env",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, prefix = %config.key_prefix, "Blob resolver ready");

        Self::new(client, config.bucket.clone(), config.key_prefix.clone())
    }

    pub fn object_key(&self, blob_id: &str) -> String {
        format!("{}{}", self.key_prefix, blob_id)
    }

    async fn fetch(&self, blob_id: &str) -> Result<Vec<u8>, ResolutionError> {
        let key = self.object_key(blob_id);
        debug!("Downloading s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| ResolutionError::fetch(blob_id, DisplayErrorContext(&e).to_string()))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| ResolutionError::fetch(blob_id, format!("reading body: {e}")))?;

        Ok(body.into_bytes().to_vec())
    }
}

#[async_trait]
impl ContentResolver for S3BlobResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, id: &str, encoding: &str) -> Result<String, ResolutionError> {
        if id.is_empty() {
            return Err(ResolutionError::MissingIdentifier);
        }

        let compressed = self.fetch(id).await?;
        let raw = gunzip(id, &compressed)?;

        debug!(
            compressed = compressed.len(),
            inflated = raw.len(),
            "Blob downloaded"
        );

        decode_text(id, &raw, encoding)
    }
}
