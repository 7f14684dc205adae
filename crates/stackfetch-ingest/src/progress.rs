//! Terminal progress for ingestion runs
//!
//! Bars draw to stderr, like the log output. Console logging goes through
//! [`ProgressWriter`], which hides the bars while a line is written so log
//! records and redraws never interleave. Skipped rows are reported once, by
//! the ingestion loop's own log record; the bar only counts them.

use crate::pipeline::{IngestEvent, IngestObserver, RunOutcome};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Create a progress bar counting written samples towards `total`
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Console writer for the tracing subscriber that pauses the progress bars
#[derive(Clone)]
pub struct ProgressWriter {
    multi: MultiProgress,
}

impl ProgressWriter {
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for ProgressWriter {
    type Writer = SuspendedStderr;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendedStderr {
            multi: self.multi.clone(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one log record and writes it to stderr with the bars hidden
pub struct SuspendedStderr {
    multi: MultiProgress,
    buf: Vec<u8>,
}

impl Write for SuspendedStderr {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let buf = std::mem::take(&mut self.buf);
        self.multi.suspend(|| {
            let mut stderr = io::stderr().lock();
            stderr.write_all(&buf)?;
            stderr.flush()
        })
    }
}

impl Drop for SuspendedStderr {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// [`IngestObserver`] that drives an indicatif bar
pub struct ProgressObserver {
    bar: ProgressBar,
    label: String,
    skipped: usize,
}

impl ProgressObserver {
    /// Add a bar for `limit` samples to `multi`
    pub fn new(multi: &MultiProgress, limit: usize, message: &str) -> Self {
        let bar = multi.add(create_progress_bar(limit as u64, message));
        bar.enable_steady_tick(Duration::from_millis(100));
        Self::with_bar(bar)
    }

    /// Wrap an existing bar (hidden bars in tests)
    pub fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            label: String::new(),
            skipped: 0,
        }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl IngestObserver for ProgressObserver {
    fn on_event(&mut self, event: &IngestEvent<'_>) {
        match event {
            IngestEvent::Started { source, limit } => {
                self.label = format!("Streaming {source}");
                self.bar.set_length(*limit as u64);
                self.bar.set_message(self.label.clone());
            },
            IngestEvent::RowWritten { written, .. } => {
                self.bar.set_position(*written as u64);
            },
            IngestEvent::RowSkipped(_) => {
                self.skipped += 1;
                self.bar
                    .set_message(format!("{} ({} skipped)", self.label, self.skipped));
            },
            IngestEvent::Finished(summary) => {
                let message = match summary.outcome {
                    RunOutcome::Done => format!("Done: {} written", summary.written),
                    RunOutcome::Exhausted => {
                        format!("Source exhausted: {} written", summary.written)
                    },
                };
                self.bar.finish_with_message(message);
            },
        }
    }
}
