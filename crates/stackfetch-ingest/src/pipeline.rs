//! The ingestion loop
//!
//! Drives a [`RowSource`] until `limit` rows have been written or the source
//! runs dry. Each row passes through three stages:
//!
//! 1. **Resolving**: use complete inline content, or fetch it through the resolver
//! 2. **Normalizing**: coerce timestamps and serialize the line in memory
//! 3. **Writing**: optional sample file, then the log line
//!
//! A failure in any stage drops the row and the loop moves on. Only problems
//! with the artifacts themselves (log, output directory) or with the source
//! abort the run.
//!
//! ```text
//! INIT ──► STREAMING ──┬─► DONE       (limit reached)
//!                      └─► EXHAUSTED  (source ended first)
//! ```

use crate::record::{file_stem, Record};
use crate::resolver::{ContentResolver, DEFAULT_ENCODING};
use crate::sink::{JsonlSink, SampleDir};
use crate::source::RowSource;
use stackfetch_common::{Result, StackError};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Where split output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitTarget {
    pub dir: PathBuf,
    /// Extension including the leading dot
    pub extension: String,
}

/// Parameters of one run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub limit: NonZeroUsize,
    pub log_path: PathBuf,
    pub split: Option<SplitTarget>,
}

/// Per-row sub-state in which a row was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStage {
    Resolving,
    Normalizing,
    Writing,
}

impl std::fmt::Display for RowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RowStage::Resolving => "resolving",
            RowStage::Normalizing => "normalizing",
            RowStage::Writing => "writing",
        })
    }
}

/// A skipped row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// 1-based position in the source
    pub index: usize,
    pub identifier: Option<String>,
    pub stage: RowStage,
    pub reason: String,
}

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The sample bound was reached
    Done,
    /// The source ended before the bound
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub written: usize,
    pub skipped: usize,
    pub log_path: PathBuf,
}

/// Progress notifications emitted by [`run_ingest`]
#[derive(Debug)]
pub enum IngestEvent<'a> {
    Started {
        source: &'a str,
        limit: usize,
    },
    RowWritten {
        index: usize,
        identifier: Option<&'a str>,
        written: usize,
        limit: usize,
    },
    RowSkipped(&'a RowFailure),
    Finished(&'a RunSummary),
}

/// Receives [`IngestEvent`]s; keeps the loop independent of any display
pub trait IngestObserver {
    fn on_event(&mut self, event: &IngestEvent<'_>);
}

impl IngestObserver for () {
    fn on_event(&mut self, _event: &IngestEvent<'_>) {}
}

impl<F> IngestObserver for F
where
    F: FnMut(&IngestEvent<'_>),
{
    fn on_event(&mut self, event: &IngestEvent<'_>) {
        self(event)
    }
}

enum RowError {
    Skip(RowFailure),
    Fatal(StackError),
}

/// Materialize up to `options.limit` rows from `source`
///
/// `resolver` is consulted only for rows without inline content; with no
/// resolver such rows are skipped.
#[instrument(skip_all, fields(source = %source.describe(), limit = options.limit.get()))]
pub async fn run_ingest<S>(
    source: &mut S,
    resolver: Option<&dyn ContentResolver>,
    options: &IngestOptions,
    observer: &mut dyn IngestObserver,
) -> Result<RunSummary>
where
    S: RowSource + ?Sized,
{
    let limit = options.limit.get();
    let mut sink = JsonlSink::create(&options.log_path)?;
    let mut samples = options
        .split
        .as_ref()
        .map(|target| SampleDir::new(&target.dir, &target.extension));

    let label = source.describe();
    observer.on_event(&IngestEvent::Started {
        source: &label,
        limit,
    });

    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut index = 0usize;

    let outcome = loop {
        let Some(mut row) = source.next_row().await? else {
            break RunOutcome::Exhausted;
        };
        index += 1;

        match process_row(&mut row, index, written, resolver, &mut sink, samples.as_mut()).await {
            Ok(identifier) => {
                written += 1;
                debug!(index, identifier = ?identifier, written, "Row written");
                observer.on_event(&IngestEvent::RowWritten {
                    index,
                    identifier: identifier.as_deref(),
                    written,
                    limit,
                });
                if written >= limit {
                    break RunOutcome::Done;
                }
            },
            Err(RowError::Skip(failure)) => {
                skipped += 1;
                warn!(
                    index = failure.index,
                    identifier = failure.identifier.as_deref().unwrap_or("<none>"),
                    stage = %failure.stage,
                    reason = %failure.reason,
                    "Skipping row"
                );
                observer.on_event(&IngestEvent::RowSkipped(&failure));
            },
            Err(RowError::Fatal(err)) => return Err(err),
        }
    };

    sink.finish()?;

    let summary = RunSummary {
        outcome,
        written,
        skipped,
        log_path: options.log_path.clone(),
    };

    info!(
        outcome = ?summary.outcome,
        written = summary.written,
        skipped = summary.skipped,
        log = %summary.log_path.display(),
        "Ingestion finished"
    );
    observer.on_event(&IngestEvent::Finished(&summary));

    Ok(summary)
}

/// Resolve, normalize and write one row; returns its identifier
async fn process_row(
    row: &mut Record,
    index: usize,
    written: usize,
    resolver: Option<&dyn ContentResolver>,
    sink: &mut JsonlSink,
    samples: Option<&mut SampleDir>,
) -> std::result::Result<Option<String>, RowError> {
    let identifier = row.identifier();
    let skip = |stage: RowStage, reason: String| {
        RowError::Skip(RowFailure {
            index,
            identifier: identifier.clone(),
            stage,
            reason,
        })
    };

    // Resolving
    let inline = row.content().map(str::to_string);
    let content = match inline {
        Some(inline) => inline,
        None => {
            let resolver = resolver.ok_or_else(|| {
                let reason = if row.has_truncated_content() {
                    "content truncated by the row source and no content resolver configured"
                } else {
                    "no inline content and no content resolver configured"
                };
                skip(RowStage::Resolving, reason.to_string())
            })?;
            let encoding = row.encoding().unwrap_or(DEFAULT_ENCODING).to_string();
            let id = identifier.as_deref().unwrap_or_default();
            let text = resolver
                .resolve(id, &encoding)
                .await
                .map_err(|e| skip(RowStage::Resolving, e.to_string()))?;
            row.set_content(text.clone());
            text
        },
    };

    // Normalizing
    row.normalize_timestamps();
    let line = row
        .to_json_line()
        .map_err(|e| skip(RowStage::Normalizing, e.to_string()))?;

    // Writing
    if let Some(samples) = samples {
        let stem = identifier
            .as_deref()
            .map(file_stem)
            .unwrap_or_else(|| format!("sample_{}", written + 1));
        match samples.write(&stem, &content) {
            Ok(_) => {},
            Err(err) if err.is_fatal() => return Err(RowError::Fatal(err.into())),
            Err(err) => return Err(skip(RowStage::Writing, err.to_string())),
        }
    }

    sink.append_line(&line)
        .map_err(|e| RowError::Fatal(StackError::io_at(sink.path(), e)))?;

    Ok(identifier)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::resolver::MapResolver;
    use crate::source::MemorySource;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn row(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => Record::from_json_object(map),
            other => panic!("not an object: {other}"),
        }
    }

    fn options(tmp: &TempDir, limit: usize, split: bool) -> IngestOptions {
        IngestOptions {
            limit: NonZeroUsize::new(limit).unwrap(),
            log_path: tmp.path().join("out.jsonl"),
            split: split.then(|| SplitTarget {
                dir: tmp.path().join("code"),
                extension: ".py".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_stops_at_limit_without_pulling_more() {
        let tmp = TempDir::new().unwrap();
        let rows = (1..=5).map(|i| row(json!({"blob_id": format!("b{i}"), "content": "x"})));
        let mut source = MemorySource::new(rows);

        let summary = run_ingest(&mut source, None, &options(&tmp, 2, false), &mut ())
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Done);
        assert_eq!(summary.written, 2);
        assert_eq!(source.remaining(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_source_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut source = MemorySource::new(vec![row(json!({"id": 1, "text": "a"}))]);

        let summary = run_ingest(&mut source, None, &options(&tmp, 10, false), &mut ())
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Exhausted);
        assert_eq!(summary.written, 1);
        let log = fs::read_to_string(tmp.path().join("out.jsonl")).unwrap();
        assert_eq!(log, "{\"id\":1,\"text\":\"a\"}\n");
    }

    #[tokio::test]
    async fn test_missing_resolver_skips_metadata_only_rows() {
        let tmp = TempDir::new().unwrap();
        let mut source = MemorySource::new(vec![
            row(json!({"blob_id": "meta-only"})),
            row(json!({"blob_id": "inline", "content": "ok"})),
        ]);
        let mut failures = Vec::new();
        let mut observer = |event: &IngestEvent<'_>| {
            if let IngestEvent::RowSkipped(f) = event {
                failures.push((*f).clone());
            }
        };

        let summary = run_ingest(&mut source, None, &options(&tmp, 5, false), &mut observer)
            .await
            .unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, RowStage::Resolving);
        assert_eq!(failures[0].identifier.as_deref(), Some("meta-only"));
        assert_eq!(failures[0].index, 1);
    }

    #[tokio::test]
    async fn test_resolved_content_is_attached_and_split() {
        let tmp = TempDir::new().unwrap();
        let resolver = MapResolver::new().with_blob("abc", "print(1)\n");
        let mut source = MemorySource::new(vec![row(
            json!({"blob_id": "abc", "src_encoding": "UTF-8", "path": "a/b.py"}),
        )]);

        run_ingest(&mut source, Some(&resolver), &options(&tmp, 1, true), &mut ())
            .await
            .unwrap();

        let log = fs::read_to_string(tmp.path().join("out.jsonl")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(log.trim_end()).unwrap();
        assert_eq!(parsed["content"], "print(1)\n");
        assert_eq!(parsed["path"], "a/b.py");
        assert_eq!(
            fs::read_to_string(tmp.path().join("code").join("abc.py")).unwrap(),
            "print(1)\n"
        );
    }

    #[tokio::test]
    async fn test_split_names_fall_back_to_sample_counter() {
        let tmp = TempDir::new().unwrap();
        let mut source = MemorySource::new(vec![
            row(json!({"repo_name": "o/r", "code": "one"})),
            row(json!({"path": "dir/two file.py", "code": "two"})),
            row(json!({"repo_name": "o/r", "code": "three"})),
        ]);

        run_ingest(&mut source, None, &options(&tmp, 3, true), &mut ())
            .await
            .unwrap();

        let code = tmp.path().join("code");
        assert_eq!(fs::read_to_string(code.join("sample_1.py")).unwrap(), "one");
        assert_eq!(fs::read_to_string(code.join("dir_two_file.py.py")).unwrap(), "two");
        assert_eq!(fs::read_to_string(code.join("sample_3.py")).unwrap(), "three");
    }

    #[tokio::test]
    async fn test_failed_sample_write_skips_row_entirely() {
        let tmp = TempDir::new().unwrap();
        // A directory squatting on the sample path makes that one write fail
        fs::create_dir_all(tmp.path().join("code").join("blocked.py")).unwrap();
        let mut source = MemorySource::new(vec![
            row(json!({"blob_id": "blocked", "content": "lost"})),
            row(json!({"repo_name": "o/r", "content": "kept"})),
        ]);
        let mut failures = Vec::new();
        let mut observer = |event: &IngestEvent<'_>| {
            if let IngestEvent::RowSkipped(f) = event {
                failures.push((*f).clone());
            }
        };

        let summary = run_ingest(&mut source, None, &options(&tmp, 5, true), &mut observer)
            .await
            .unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, RowStage::Writing);
        assert_eq!(failures[0].identifier.as_deref(), Some("blocked"));

        let log = fs::read_to_string(tmp.path().join("out.jsonl")).unwrap();
        assert_eq!(log, "{\"repo_name\":\"o/r\",\"content\":\"kept\"}\n");
        // The failed row did not advance the sample counter
        assert_eq!(
            fs::read_to_string(tmp.path().join("code").join("sample_1.py")).unwrap(),
            "kept"
        );
    }

    #[tokio::test]
    async fn test_truncated_inline_content_goes_to_resolver_or_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let partial = || {
            let mut r = row(json!({"blob_id": "t1", "content": "fn main() { let x = 1"}));
            r.mark_truncated("content");
            r
        };

        let mut failures = Vec::new();
        let mut observer = |event: &IngestEvent<'_>| {
            if let IngestEvent::RowSkipped(f) = event {
                failures.push((*f).clone());
            }
        };
        let mut source = MemorySource::new(vec![partial()]);
        let summary = run_ingest(&mut source, None, &options(&tmp, 1, true), &mut observer)
            .await
            .unwrap();
        assert_eq!(summary.written, 0);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, RowStage::Resolving);
        assert!(failures[0].reason.contains("truncated"));
        assert!(!tmp.path().join("code").join("t1.py").exists());

        let resolver = MapResolver::new().with_blob("t1", "fn main() { let x = 1; }\n");
        let mut source = MemorySource::new(vec![partial()]);
        let summary = run_ingest(&mut source, Some(&resolver), &options(&tmp, 1, true), &mut ())
            .await
            .unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(
            fs::read_to_string(tmp.path().join("code").join("t1.py")).unwrap(),
            "fn main() { let x = 1; }\n"
        );
    }

    #[tokio::test]
    async fn test_unusable_output_directory_aborts() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("code"), "occupied").unwrap();
        let mut source = MemorySource::new(vec![row(json!({"blob_id": "a", "content": "x"}))]);

        let err = run_ingest(&mut source, None, &options(&tmp, 1, true), &mut ())
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::Io(_)));
        assert_eq!(fs::read_to_string(tmp.path().join("out.jsonl")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_unopenable_log_aborts_before_streaming() {
        let tmp = TempDir::new().unwrap();
        let mut opts = options(&tmp, 1, false);
        opts.log_path = tmp.path().to_path_buf();
        let mut source = MemorySource::new(vec![row(json!({"blob_id": "a", "content": "x"}))]);

        assert!(run_ingest(&mut source, None, &opts, &mut ()).await.is_err());
        assert_eq!(source.remaining(), 1);
    }
}
