//! Row counts per language subset of the dedup dataset

use crate::config::{DatasetProfile, HfConfig, SubsetRef};
use crate::language::Language;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsetStats {
    pub language: Language,
    pub config: String,
    /// `None` when the count could not be obtained
    pub rows: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub subsets: Vec<SubsetStats>,
}

impl StatsReport {
    /// Sum over the subsets whose count is known
    pub fn total(&self) -> usize {
        self.subsets.iter().filter_map(|s| s.rows).sum()
    }

    pub fn unknown(&self) -> usize {
        self.subsets.iter().filter(|s| s.rows.is_none()).count()
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for subset in &self.subsets {
            match subset.rows {
                Some(rows) => writeln!(f, "{:<12} {:>14}", subset.config, rows)?,
                None => writeln!(f, "{:<12} {:>14}", subset.config, "unknown")?,
            }
        }
        write!(f, "{:<12} {:>14}", "total", self.total())?;
        if self.unknown() > 0 {
            write!(f, " ({} unknown)", self.unknown())?;
        }
        Ok(())
    }
}

/// Query `/size` for each language's dedup subset
///
/// Requests run one after another. A failed lookup is logged and reported as
/// unknown instead of failing the whole report.
#[instrument(skip_all, fields(languages = languages.len()))]
pub async fn fetch_subset_stats(
    client: &reqwest::Client,
    config: &HfConfig,
    languages: &[Language],
) -> StatsReport {
    let mut report = StatsReport::default();

    for &language in languages {
        let subset = SubsetRef::new(DatasetProfile::Dedup, language);
        let rows = match fetch_row_count(client, config, &subset).await {
            Ok(rows) => {
                debug!(subset = %subset, rows, "Fetched subset size");
                Some(rows)
            },
            Err(reason) => {
                warn!(subset = %subset, error = %reason, "Could not fetch subset size");
                None
            },
        };
        report.subsets.push(SubsetStats {
            language,
            config: subset.config,
            rows,
        });
    }

    info!(
        total = report.total(),
        unknown = report.unknown(),
        "Subset statistics collected"
    );

    report
}

async fn fetch_row_count(
    client: &reqwest::Client,
    config: &HfConfig,
    subset: &SubsetRef,
) -> std::result::Result<usize, String> {
    let url = format!("{}/size", config.base_url.trim_end_matches('/'));
    let mut request = client.get(url).query(&[
        ("dataset", subset.dataset.as_str()),
        ("config", subset.config.as_str()),
    ]);

    if let Some(token) = &config.token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("HTTP {}: {}", status, body.trim()));
    }

    let json: Value = response
        .json()
        .await
        .map_err(|e| format!("malformed size response: {e}"))?;

    split_row_count(&json, &subset.config, &subset.split)
        .ok_or_else(|| format!("no row count for split '{}' in size response", subset.split))
}

/// Pull `num_rows` for one config/split out of a `/size` payload
///
/// Looks at `size.splits[]` first, then `size.configs[].splits[]`, then the
/// config-level `size.config.num_rows` when the split list is absent.
fn split_row_count(json: &Value, config_name: &str, split_name: &str) -> Option<usize> {
    let to_usize = |value: &Value| value.as_u64().and_then(|raw| usize::try_from(raw).ok());
    let name_of = |entry: &Value, primary: &str, alias: &str| {
        entry
            .get(primary)
            .or_else(|| entry.get(alias))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let size = json.get("size")?;

    if let Some(splits) = size.get("splits").and_then(Value::as_array) {
        let found = splits.iter().find(|entry| {
            name_of(entry, "config", "config_name") == config_name
                && name_of(entry, "split", "name") == split_name
        });
        if let Some(rows) = found.and_then(|entry| entry.get("num_rows")).and_then(to_usize) {
            return Some(rows);
        }
    }

    if let Some(configs) = size.get("configs").and_then(Value::as_array) {
        let splits = configs
            .iter()
            .filter(|entry| name_of(entry, "config", "config_name") == config_name)
            .filter_map(|entry| entry.get("splits").and_then(Value::as_array))
            .flatten();
        for entry in splits {
            if name_of(entry, "split", "name") == split_name {
                if let Some(rows) = entry.get("num_rows").and_then(to_usize) {
                    return Some(rows);
                }
            }
        }
    }

    let config_entry = size.get("config")?;
    if size.get("splits").is_none() && name_of(config_entry, "config", "config_name") == config_name
    {
        return config_entry.get("num_rows").and_then(to_usize);
    }

    None
}
