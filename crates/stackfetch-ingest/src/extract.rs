//! Split an existing JSON-lines log into one file per sample
//!
//! Uses the same content and identifier lookups as the ingestion loop, so a
//! log produced by a run without `--split` yields the same files a split run
//! would have written.

use crate::record::{file_stem, Record};
use crate::sink::SampleDir;
use stackfetch_common::{Result, StackError};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Write `<identifier><extension>` under `out_dir` for every usable log line
///
/// Unparseable lines, lines without content or identifier, and individual
/// file write failures are skipped. A missing log or an output directory that
/// cannot be created aborts.
#[instrument(skip_all, fields(log = %log_path.display(), out_dir = %out_dir.display()))]
pub fn extract_samples(log_path: &Path, out_dir: &Path, extension: &str) -> Result<ExtractSummary> {
    let file = File::open(log_path).map_err(|e| StackError::io_at(log_path, e))?;
    let reader = BufReader::new(file);
    let mut samples = SampleDir::new(out_dir, extension);
    let mut summary = ExtractSummary::default();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!(line = line_no, error = %e, "Skipping line that is not UTF-8");
                summary.skipped += 1;
                continue;
            },
            Err(e) => return Err(StackError::io_at(log_path, e)),
        };

        if line.trim().is_empty() {
            continue;
        }

        let record = match Record::from_json_line(&line) {
            Ok(record) => record,
            Err(e) => {
                let preview: String = line.chars().take(50).collect();
                warn!(line = line_no, error = %e, preview = %preview, "Skipping invalid JSON line");
                summary.skipped += 1;
                continue;
            },
        };

        let (Some(content), Some(identifier)) = (record.content(), record.identifier()) else {
            warn!(line = line_no, "Skipping line without content or identifier");
            summary.skipped += 1;
            continue;
        };

        match samples.write(&file_stem(&identifier), content) {
            Ok(path) => {
                summary.written += 1;
                debug!(line = line_no, path = %path.display(), "Extracted sample");
            },
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                warn!(line = line_no, identifier = %identifier, error = %err, "Failed to write sample");
                summary.skipped += 1;
            },
        }
    }

    info!(
        written = summary.written,
        skipped = summary.skipped,
        "Extraction finished"
    );

    Ok(summary)
}
