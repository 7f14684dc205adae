//! Row sources
//!
//! A row source yields [`Record`]s lazily and in order. It cannot be rewound;
//! once a row has been handed out it is owned by the caller.

pub mod datasets_server;

pub use datasets_server::DatasetsServerSource;

use crate::record::Record;
use async_trait::async_trait;
use stackfetch_common::Result;
use std::collections::VecDeque;

/// Lazy, ordered, non-restartable sequence of dataset rows
#[async_trait]
pub trait RowSource: Send {
    /// Next row, or `None` once the partition is exhausted
    ///
    /// An error here is fatal for the run; per-row problems are the ingestion
    /// loop's business, not the source's.
    async fn next_row(&mut self) -> Result<Option<Record>>;

    /// Short label for diagnostics
    fn describe(&self) -> String;
}

/// Rows held in memory, handed out front to back
#[derive(Debug, Default)]
pub struct MemorySource {
    rows: VecDeque<Record>,
}

impl MemorySource {
    pub fn new(rows: impl IntoIterator<Item = Record>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait]
impl RowSource for MemorySource {
    async fn next_row(&mut self) -> Result<Option<Record>> {
        Ok(self.rows.pop_front())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
