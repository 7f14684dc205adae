//! Row source backed by the Hugging Face datasets-server `/rows` API
//!
//! Pages are pulled on demand, `page_size` rows at a time. Columns whose
//! feature type is `timestamp[...]` are decoded into native date-times so the
//! ingestion loop sees the same shapes the dataset declares.

use super::RowSource;
use crate::config::{HfConfig, SubsetRef};
use crate::record::{FieldValue, Record};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};
use stackfetch_common::{Result, StackError};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, instrument};

#[derive(Debug, Deserialize)]
struct RowsPage {
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    rows: Vec<PageRow>,
    #[serde(default)]
    num_rows_total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    name: String,
    #[serde(rename = "type", default)]
    kind: Value,
}

#[derive(Debug, Deserialize)]
struct PageRow {
    row: Map<String, Value>,
    /// Columns the server cut short to keep the page small
    #[serde(default)]
    truncated_cells: Vec<String>,
}

/// Resolution of an integer timestamp column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

impl TimeUnit {
    /// Parse the unit out of an Arrow-style dtype such as `timestamp[us, tz=UTC]`
    pub fn from_dtype(dtype: &str) -> Option<Self> {
        let inner = dtype.strip_prefix("timestamp")?;
        let unit = inner
            .trim_start_matches('[')
            .split([',', ']'])
            .next()
            .unwrap_or_default()
            .trim();
        match unit {
            "s" => Some(TimeUnit::Seconds),
            "ms" => Some(TimeUnit::Millis),
            "us" => Some(TimeUnit::Micros),
            // Arrow's default when the unit is omitted
            "ns" | "" => Some(TimeUnit::Nanos),
            _ => None,
        }
    }

    fn per_second(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Millis => 1_000,
            TimeUnit::Micros => 1_000_000,
            TimeUnit::Nanos => 1_000_000_000,
        }
    }
}

/// Decode a raw timestamp cell; `None` leaves the cell untouched
pub fn decode_timestamp(value: &Value, unit: TimeUnit) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            let per_second = unit.per_second();
            let secs = raw.div_euclid(per_second);
            let nanos = raw.rem_euclid(per_second) * (1_000_000_000 / per_second);
            DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?).map(|dt| dt.fixed_offset())
        },
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Paginated reader over one dataset partition
pub struct DatasetsServerSource {
    client: reqwest::Client,
    config: HfConfig,
    subset: SubsetRef,
    timestamp_columns: HashMap<String, TimeUnit>,
    buffer: VecDeque<Record>,
    next_offset: usize,
    total_rows: Option<usize>,
    exhausted: bool,
}

impl DatasetsServerSource {
    /// Open the partition and pull the first page
    ///
    /// Any failure here means the subset could not be located and is reported
    /// as [`StackError::SubsetNotFound`].
    #[instrument(skip(client, config, subset), fields(subset = %subset))]
    pub async fn open(client: reqwest::Client, config: HfConfig, subset: SubsetRef) -> Result<Self> {
        let mut source = Self {
            client,
            config,
            subset,
            timestamp_columns: HashMap::new(),
            buffer: VecDeque::new(),
            next_offset: 0,
            total_rows: None,
            exhausted: false,
        };

        let page = source
            .fetch_page()
            .await
            .map_err(|reason| StackError::SubsetNotFound {
                dataset: source.subset.dataset.clone(),
                config: source.subset.config.clone(),
                reason,
            })?;
        source.absorb(page);

        info!(
            total_rows = ?source.total_rows,
            timestamp_columns = source.timestamp_columns.len(),
            "Opened dataset stream"
        );

        Ok(source)
    }

    /// Row count reported by the server, when it sent one
    pub fn total_rows(&self) -> Option<usize> {
        self.total_rows
    }

    fn rows_url(&self) -> String {
        format!("{}/rows", self.config.base_url.trim_end_matches('/'))
    }

    async fn fetch_page(&self) -> std::result::Result<RowsPage, String> {
        debug!(offset = self.next_offset, length = self.config.page_size, "Fetching rows page");

        let offset = self.next_offset.to_string();
        let length = self.config.page_size.to_string();
        let mut request = self.client.get(self.rows_url()).query(&[
            ("dataset", self.subset.dataset.as_str()),
            ("config", self.subset.config.as_str()),
            ("split", self.subset.split.as_str()),
            ("offset", offset.as_str()),
            ("length", length.as_str()),
        ]);

        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, body.trim()));
        }

        response
            .json::<RowsPage>()
            .await
            .map_err(|e| format!("malformed rows response: {e}"))
    }

    fn absorb(&mut self, page: RowsPage) {
        for feature in &page.features {
            let unit = feature
                .kind
                .get("dtype")
                .and_then(Value::as_str)
                .and_then(TimeUnit::from_dtype);
            if let Some(unit) = unit {
                self.timestamp_columns.insert(feature.name.clone(), unit);
            }
        }

        if page.num_rows_total.is_some() {
            self.total_rows = page.num_rows_total;
        }

        let fetched = page.rows.len();
        self.next_offset += fetched;

        for PageRow {
            row,
            truncated_cells,
        } in page.rows
        {
            let mut record = self.decode_row(row);
            for column in truncated_cells {
                record.mark_truncated(column);
            }
            self.buffer.push_back(record);
        }

        let past_end = self
            .total_rows
            .is_some_and(|total| self.next_offset >= total);
        if fetched == 0 || past_end {
            self.exhausted = true;
        }
    }

    fn decode_row(&self, row: Map<String, Value>) -> Record {
        row.into_iter()
            .map(|(name, value)| {
                let decoded = self
                    .timestamp_columns
                    .get(&name)
                    .and_then(|unit| decode_timestamp(&value, *unit));
                let field = match decoded {
                    Some(dt) => FieldValue::DateTime(dt),
                    None => FieldValue::Json(value),
                };
                (name, field)
            })
            .collect()
    }
}

#[async_trait]
impl RowSource for DatasetsServerSource {
    async fn next_row(&mut self) -> Result<Option<Record>> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self.fetch_page().await.map_err(|reason| {
                StackError::source(format!(
                    "{} at offset {}: {}",
                    self.subset, self.next_offset, reason
                ))
            })?;
            self.absorb(page);
        }

        Ok(self.buffer.pop_front())
    }

    fn describe(&self) -> String {
        self.subset.to_string()
    }
}
