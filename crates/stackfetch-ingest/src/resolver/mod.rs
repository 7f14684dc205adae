//! Content resolvers
//!
//! Rows from the deduplicated dataset only carry a blob identifier and the
//! declared source encoding. A [`ContentResolver`] turns that pair into text.
//! Every failure is a [`ResolutionError`], which the ingestion loop treats as
//! "skip this row".

pub mod s3;

pub use s3::S3BlobResolver;

use async_trait::async_trait;
use encoding_rs::Encoding;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

/// Encoding assumed when a row does not declare one.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Why a single blob could not be turned into text
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("row has no content identifier")]
    MissingIdentifier,

    #[error("failed to fetch blob {id}: {reason}")]
    Fetch { id: String, reason: String },

    #[error("failed to decompress blob {id}: {source}")]
    Decompress {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown encoding label '{0}'")]
    UnknownEncoding(String),

    #[error("blob {id} is not valid {encoding}")]
    Malformed { id: String, encoding: String },
}

impl ResolutionError {
    pub fn fetch(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Resolves a blob identifier and encoding into decoded text
#[async_trait]
pub trait ContentResolver: Send + Sync {
    async fn resolve(&self, id: &str, encoding: &str) -> Result<String, ResolutionError>;
}

/// Inflate a gzip member
pub fn gunzip(id: &str, compressed: &[u8]) -> Result<Vec<u8>, ResolutionError> {
    let mut raw = Vec::with_capacity(compressed.len() * 3);
    GzDecoder::new(compressed)
        .read_to_end(&mut raw)
        .map_err(|source| ResolutionError::Decompress {
            id: id.to_string(),
            source,
        })?;
    Ok(raw)
}

/// Labels decoded as ISO-8859-1 proper: every byte maps to the code point of
/// the same value. The web encoding standard folds these into windows-1252.
const LATIN1_LABELS: [&str; 11] = [
    "latin_1",
    "latin1",
    "latin",
    "l1",
    "iso_8859_1",
    "iso8859_1",
    "iso_8859_1_1987",
    "iso_ir_100",
    "8859",
    "cp819",
    "csisolatin1",
];

/// Labels decoded as 7-bit ASCII; any byte above 0x7F is malformed.
const ASCII_LABELS: [&str; 12] = [
    "ascii",
    "us_ascii",
    "us",
    "646",
    "ansi_x3.4_1968",
    "ansi_x3_4_1968",
    "ansi_x3.4_1986",
    "cp367",
    "csascii",
    "ibm367",
    "iso646_us",
    "iso_ir_6",
];

/// Lowercase with `-` and spaces folded to `_`
fn normalize_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Strictly decode `bytes` with the encoding named by `label`
///
/// Latin-1 and ASCII labels are handled byte for byte; everything else goes
/// through the WHATWG label table. Malformed input is an error rather than
/// being replaced with U+FFFD.
pub fn decode_text(id: &str, bytes: &[u8], label: &str) -> Result<String, ResolutionError> {
    let normalized = normalize_label(label);

    if LATIN1_LABELS.contains(&normalized.as_str()) {
        return Ok(bytes.iter().map(|&b| char::from(b)).collect());
    }

    if ASCII_LABELS.contains(&normalized.as_str()) {
        if !bytes.is_ascii() {
            return Err(ResolutionError::Malformed {
                id: id.to_string(),
                encoding: "ASCII".to_string(),
            });
        }
        return Ok(bytes.iter().map(|&b| char::from(b)).collect());
    }

    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ResolutionError::UnknownEncoding(label.to_string()))?;

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| ResolutionError::Malformed {
            id: id.to_string(),
            encoding: encoding.name().to_string(),
        })
}

/// Resolver over an in-memory table; unknown ids fail like a missing object
#[derive(Debug, Default, Clone)]
pub struct MapResolver {
    blobs: HashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(mut self, id: impl Into<String>, content: impl Into<String>) -> Self {
        self.blobs.insert(id.into(), content.into());
        self
    }
}

#[async_trait]
impl ContentResolver for MapResolver {
    async fn resolve(&self, id: &str, _encoding: &str) -> Result<String, ResolutionError> {
        if id.is_empty() {
            return Err(ResolutionError::MissingIdentifier);
        }
        self.blobs
            .get(id)
            .cloned()
            .ok_or_else(|| ResolutionError::fetch(id, "no such object"))
    }
}
