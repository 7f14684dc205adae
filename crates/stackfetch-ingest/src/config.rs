//! Runtime configuration
//!
//! Dataset profiles are compiled in; connection settings come from the
//! environment (optionally seeded from a `.env` file by the binary).

use crate::language::Language;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use stackfetch_common::{Result, StackError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Samples written when `--count` is not given.
pub const DEFAULT_SAMPLE_COUNT: usize = 1000;

/// Public datasets-server endpoint.
pub const DEFAULT_DATASETS_SERVER_URL: &str = "https://datasets-server.huggingface.co";

/// The `/rows` endpoint refuses pages larger than this.
pub const MAX_PAGE_SIZE: usize = 100;

/// Software Heritage public bucket holding gzipped blobs.
pub const DEFAULT_BLOB_BUCKET: &str = "softwareheritage";
pub const DEFAULT_BLOB_PREFIX: &str = "content/";
pub const DEFAULT_BLOB_REGION: &str = "us-east-1";

pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";

// ============================================================================
// Dataset profiles
// ============================================================================

/// Which mirror of The Stack v2 to stream from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatasetProfile {
    /// `bigcode/the-stack-v2-dedup`: metadata only, blobs live in S3
    #[default]
    Dedup,
    /// `AISE-TUDelft/the-stack-v2`: file content is inline on each row
    Aise,
}

impl DatasetProfile {
    pub fn repository(self) -> &'static str {
        match self {
            DatasetProfile::Dedup => "bigcode/the-stack-v2-dedup",
            DatasetProfile::Aise => "AISE-TUDelft/the-stack-v2",
        }
    }

    /// Dataset config (subset) that holds rows for `language`
    pub fn config_for(self, language: Language) -> &'static str {
        match self {
            DatasetProfile::Dedup => language.subset(),
            DatasetProfile::Aise => language.folder(),
        }
    }

    pub fn split(self) -> &'static str {
        "train"
    }

    /// Whether rows must be completed from the blob store
    pub fn needs_blob_store(self) -> bool {
        matches!(self, DatasetProfile::Dedup)
    }

    pub fn default_jsonl(self, language: Language) -> PathBuf {
        match self {
            DatasetProfile::Dedup => PathBuf::from(format!("{}_samples.jsonl", language.key())),
            DatasetProfile::Aise => {
                PathBuf::from(format!("{}_aise_samples.jsonl", language.key()))
            },
        }
    }

    pub fn default_outdir(self, language: Language) -> PathBuf {
        match self {
            DatasetProfile::Dedup => PathBuf::from(format!("{}_code_output", language.key())),
            DatasetProfile::Aise => {
                PathBuf::from(format!("{}_aise_code_output", language.key()))
            },
        }
    }
}

/// A resolved dataset partition: repository, config and split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetRef {
    pub dataset: String,
    pub config: String,
    pub split: String,
}

impl SubsetRef {
    pub fn new(profile: DatasetProfile, language: Language) -> Self {
        Self {
            dataset: profile.repository().to_string(),
            config: profile.config_for(language).to_string(),
            split: profile.split().to_string(),
        }
    }
}

impl std::fmt::Display for SubsetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}[{}]", self.dataset, self.config, self.split)
    }
}

// ============================================================================
// Hugging Face datasets-server
// ============================================================================

/// Connection settings for the datasets-server API
#[derive(Debug, Clone)]
pub struct HfConfig {
    pub base_url: String,
    pub token: Option<String>,
    /// Per-request timeout; requests wait indefinitely when unset
    pub timeout: Option<Duration>,
    pub page_size: usize,
}

impl Default for HfConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DATASETS_SERVER_URL.to_string(),
            token: None,
            timeout: None,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl HfConfig {
    /// Load from `HF_DATASETS_SERVER_URL`, `HF_TOKEN` and `HF_API_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("HF_DATASETS_SERVER_URL") {
            config.base_url = url;
        }

        config.token = env::var("HF_TOKEN").ok().filter(|t| !t.is_empty());

        if let Some(secs) = env::var("HF_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.timeout = Some(Duration::from_secs(secs));
        }

        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Build the shared HTTP client
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("stackfetch/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| StackError::config(format!("failed to build HTTP client: {e}")))
    }
}

// ============================================================================
// Object store
// ============================================================================

/// Settings for the blob store. Credentials are mandatory.
#[derive(Clone, Serialize, Deserialize)]
pub struct BlobStoreConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub key_prefix: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl std::fmt::Debug for BlobStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStoreConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("key_prefix", &self.key_prefix)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl BlobStoreConfig {
    /// Load from the environment
    ///
    /// Fails with [`StackError::MissingCredentials`] when either AWS key is
    /// unset or empty. Everything else has a default pointing at the public
    /// Software Heritage bucket.
    pub fn from_env() -> Result<Self> {
        let access_key = required_var(ACCESS_KEY_VAR)?;
        let secret_key = required_var(SECRET_KEY_VAR)?;

        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").ok().filter(|e| !e.is_empty()),
            region: env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_BLOB_REGION.to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| DEFAULT_BLOB_BUCKET.to_string()),
            key_prefix: env::var("S3_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_BLOB_PREFIX.to_string()),
            access_key,
            secret_key,
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StackError::MissingCredentials(name.to_string()))
}
