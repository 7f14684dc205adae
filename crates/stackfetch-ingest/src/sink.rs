//! Output artifacts: the JSON-lines log and the per-sample directory

use stackfetch_common::{Result, StackError};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Append-only JSON-lines log
///
/// The file is truncated on open. Every line is written whole and flushed
/// before `append_line` returns, so an interrupted run leaves a valid prefix.
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl JsonlSink {
    /// Create or truncate the log, creating missing parent directories
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StackError::io_at(parent, e))?;
        }

        let file = File::create(&path).map_err(|e| StackError::io_at(&path, e))?;
        debug!(path = %path.display(), "Opened JSON-lines log");

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    /// Write one complete line (must already end in `\n`) and flush it
    pub fn append_line(&mut self, line: &str) -> io::Result<()> {
        debug_assert!(line.ends_with('\n'), "log lines carry their own newline");
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        self.lines += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close, returning the number of lines written
    pub fn finish(mut self) -> Result<usize> {
        self.writer
            .flush()
            .map_err(|e| StackError::io_at(&self.path, e))?;
        info!(path = %self.path.display(), lines = self.lines, "Closed JSON-lines log");
        Ok(self.lines)
    }
}

/// Failure writing one sample file
#[derive(Error, Debug)]
pub enum SampleWriteError {
    /// The output directory itself is unusable; the run cannot continue
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Only this sample is affected
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SampleWriteError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SampleWriteError::CreateDir { .. })
    }
}

impl From<SampleWriteError> for StackError {
    fn from(err: SampleWriteError) -> Self {
        match err {
            SampleWriteError::CreateDir { path, source } | SampleWriteError::Write { path, source } => {
                StackError::io_at(&path, source)
            },
        }
    }
}

/// Directory of `<stem><extension>` sample files, created on first write
#[derive(Debug, Clone)]
pub struct SampleDir {
    dir: PathBuf,
    extension: String,
    created: bool,
}

impl SampleDir {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            created: false,
        }
    }

    pub fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}{}", stem, self.extension))
    }

    fn ensure_created(&mut self) -> std::result::Result<(), SampleWriteError> {
        if self.created {
            return Ok(());
        }
        let existed = self.dir.is_dir();
        fs::create_dir_all(&self.dir).map_err(|source| SampleWriteError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;
        if !existed {
            info!(dir = %self.dir.display(), "Created output directory");
        }
        self.created = true;
        Ok(())
    }

    /// Write `content` to `<stem><extension>`, overwriting any previous file
    pub fn write(
        &mut self,
        stem: &str,
        content: &str,
    ) -> std::result::Result<PathBuf, SampleWriteError> {
        self.ensure_created()?;
        let path = self.path_for(stem);
        fs::write(&path, content).map_err(|source| SampleWriteError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
