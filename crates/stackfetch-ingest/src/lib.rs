//! Stackfetch Ingest Library
//!
//! Streams source-code samples for one language out of The Stack v2 and
//! materializes them as a JSON-lines log plus, optionally, one file per
//! sample.
//!
//! # Dataset profiles
//!
//! - **dedup**: `bigcode/the-stack-v2-dedup`, rows carry a `blob_id` and the
//!   file body is fetched from the Software Heritage S3 bucket
//! - **aise**: `AISE-TUDelft/the-stack-v2`, file content is inline
//!
//! # Example
//!
//! ```no_run
//! use stackfetch_ingest::config::{DatasetProfile, HfConfig, SubsetRef};
//! use stackfetch_ingest::language::Language;
//! use stackfetch_ingest::pipeline::{run_ingest, IngestOptions};
//! use stackfetch_ingest::source::DatasetsServerSource;
//! use std::num::NonZeroUsize;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let hf = HfConfig::from_env();
//!     let client = hf.http_client()?;
//!     let subset = SubsetRef::new(DatasetProfile::Aise, Language::Rust);
//!     let mut source = DatasetsServerSource::open(client, hf, subset).await?;
//!
//!     let options = IngestOptions {
//!         limit: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
//!         log_path: "rust_aise_samples.jsonl".into(),
//!         split: None,
//!     };
//!     run_ingest(&mut source, None, &options, &mut ()).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod extract;
pub mod language;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod resolver;
pub mod sink;
pub mod source;
pub mod stats;

pub use config::{BlobStoreConfig, DatasetProfile, HfConfig, SubsetRef};
pub use extract::{extract_samples, ExtractSummary};
pub use language::Language;
pub use pipeline::{run_ingest, IngestOptions, RunOutcome, RunSummary, SplitTarget};
pub use record::Record;
pub use stackfetch_common::{Result, StackError};
