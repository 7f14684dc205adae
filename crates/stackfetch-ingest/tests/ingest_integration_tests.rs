//! Integration tests for the ingestion pipeline against a mocked datasets-server
//!
//! Covers:
//! - Paging through `/rows` and stopping once the limit is reached
//! - Timestamp columns decoded by the source and normalized in the log
//! - Per-row resolution failures skipped without aborting
//! - Cells the server truncated never written as samples
//! - Startup and mid-stream source failures
//! - Extracting the resulting log back into per-sample files

use serde_json::{json, Value};
use stackfetch_ingest::config::{HfConfig, SubsetRef};
use stackfetch_ingest::extract::extract_samples;
use stackfetch_ingest::pipeline::{run_ingest, IngestOptions, RunOutcome, SplitTarget};
use stackfetch_ingest::resolver::MapResolver;
use stackfetch_ingest::source::{DatasetsServerSource, RowSource};
use stackfetch_ingest::StackError;
use std::fs;
use std::num::NonZeroUsize;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const DATASET: &str = "bigcode/the-stack-v2-dedup";

fn subset() -> SubsetRef {
    SubsetRef {
        dataset: DATASET.to_string(),
        config: "Python".to_string(),
        split: "train".to_string(),
    }
}

fn features() -> Value {
    json!([
        {"feature_idx": 0, "name": "blob_id", "type": {"dtype": "string", "_type": "Value"}},
        {"feature_idx": 1, "name": "path", "type": {"dtype": "string", "_type": "Value"}},
        {"feature_idx": 2, "name": "src_encoding", "type": {"dtype": "string", "_type": "Value"}},
        {"feature_idx": 3, "name": "visit_date", "type": {"dtype": "timestamp[us]", "_type": "Value"}},
        {"feature_idx": 4, "name": "revision_date", "type": {"dtype": "timestamp[us]", "_type": "Value"}}
    ])
}

fn meta_row(idx: usize, blob_id: &str) -> Value {
    json!({
        "row_idx": idx,
        "row": {
            "blob_id": blob_id,
            "path": format!("/pkg/{blob_id}.py"),
            "src_encoding": "UTF-8",
            "visit_date": "2023-05-01T10:00:00",
            "revision_date": 1_600_000_000_000_000i64
        },
        "truncated_cells": []
    })
}

fn page(rows: Vec<Value>, total: usize) -> Value {
    json!({
        "features": features(),
        "rows": rows,
        "num_rows_total": total,
        "num_rows_per_page": 100,
        "partial": false
    })
}

async fn mount_page(server: &MockServer, offset: usize, body: Value, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/rows"))
        .and(query_param("dataset", DATASET))
        .and(query_param("config", "Python"))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn hf_config(server: &MockServer) -> HfConfig {
    HfConfig::default()
        .with_base_url(server.uri())
        .with_page_size(2)
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn test_limit_with_one_unresolvable_row() {
    let server = MockServer::start().await;
    mount_page(&server, 0, page(vec![meta_row(0, "b1"), meta_row(1, "b2")], 5), 1).await;
    mount_page(&server, 2, page(vec![meta_row(2, "b3"), meta_row(3, "b4")], 5), 1).await;
    // The limit is reached before this page is needed
    mount_page(&server, 4, page(vec![meta_row(4, "b5")], 5), 0).await;

    let config = hf_config(&server);
    let client = config.http_client().unwrap();
    let mut source = DatasetsServerSource::open(client, config, subset()).await.unwrap();
    assert_eq!(source.total_rows(), Some(5));

    let resolver = MapResolver::new()
        .with_blob("b1", "print(1)\n")
        .with_blob("b3", "print(3)\n")
        .with_blob("b4", "print(4)\n")
        .with_blob("b5", "print(5)\n");

    let tmp = TempDir::new().unwrap();
    let options = IngestOptions {
        limit: NonZeroUsize::new(3).unwrap(),
        log_path: tmp.path().join("python_samples.jsonl"),
        split: Some(SplitTarget {
            dir: tmp.path().join("python_code_output"),
            extension: ".py".to_string(),
        }),
    };

    let summary = run_ingest(&mut source, Some(&resolver), &options, &mut ())
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Done);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.skipped, 1);

    let log = fs::read_to_string(&options.log_path).unwrap();
    let lines: Vec<Value> = log
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let ids: Vec<&str> = lines.iter().map(|l| l["blob_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["b1", "b3", "b4"]);

    // Timestamps were decoded by the source and rendered as ISO strings
    assert_eq!(lines[0]["visit_date"], "2023-05-01T10:00:00Z");
    assert_eq!(lines[0]["revision_date"], "2020-09-13T12:26:40Z");
    assert_eq!(lines[1]["content"], "print(3)\n");
    // Field order follows the dataset, content is appended
    let keys: Vec<&String> = lines[0].as_object().unwrap().keys().collect();
    assert_eq!(keys.first().map(|k| k.as_str()), Some("blob_id"));
    assert_eq!(keys.last().map(|k| k.as_str()), Some("content"));

    let out = tmp.path().join("python_code_output");
    assert_eq!(fs::read_dir(&out).unwrap().count(), 3);
    assert!(!out.join("b2.py").exists());
    assert_eq!(fs::read_to_string(out.join("b4.py")).unwrap(), "print(4)\n");
}

#[tokio::test]
async fn test_short_subset_is_exhausted() {
    let server = MockServer::start().await;
    mount_page(&server, 0, page(vec![meta_row(0, "b1"), meta_row(1, "b2")], 2), 1).await;

    let config = hf_config(&server);
    let client = config.http_client().unwrap();
    let mut source = DatasetsServerSource::open(client, config, subset()).await.unwrap();

    let resolver = MapResolver::new().with_blob("b1", "a").with_blob("b2", "b");
    let tmp = TempDir::new().unwrap();
    let options = IngestOptions {
        limit: NonZeroUsize::new(10).unwrap(),
        log_path: tmp.path().join("out.jsonl"),
        split: None,
    };

    let summary = run_ingest(&mut source, Some(&resolver), &options, &mut ())
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Exhausted);
    assert_eq!(summary.written, 2);
    assert_eq!(fs::read_to_string(&options.log_path).unwrap().lines().count(), 2);
}

#[tokio::test]
async fn test_inline_content_needs_no_resolver() {
    let server = MockServer::start().await;
    let rows = vec![
        json!({"row_idx": 0, "row": {"path": "src/a.rs", "content": "fn a() {}"}, "truncated_cells": []}),
        json!({"row_idx": 1, "row": {"path": "src/b.rs", "content": "fn b() {}"}, "truncated_cells": []}),
    ];
    let body = json!({
        "features": [
            {"feature_idx": 0, "name": "path", "type": {"dtype": "string", "_type": "Value"}},
            {"feature_idx": 1, "name": "content", "type": {"dtype": "string", "_type": "Value"}}
        ],
        "rows": rows,
        "num_rows_total": 2
    });
    Mock::given(method("GET"))
        .and(path("/rows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let config = hf_config(&server);
    let client = config.http_client().unwrap();
    let aise = SubsetRef {
        dataset: "AISE-TUDelft/the-stack-v2".to_string(),
        config: "Rust_Files".to_string(),
        split: "train".to_string(),
    };
    let mut source = DatasetsServerSource::open(client, config, aise).await.unwrap();

    let tmp = TempDir::new().unwrap();
    let options = IngestOptions {
        limit: NonZeroUsize::new(2).unwrap(),
        log_path: tmp.path().join("rust_aise_samples.jsonl"),
        split: Some(SplitTarget {
            dir: tmp.path().join("rust_aise_code_output"),
            extension: ".rs".to_string(),
        }),
    };

    let summary = run_ingest(&mut source, None, &options, &mut ()).await.unwrap();
    assert_eq!(summary.written, 2);

    let out = tmp.path().join("rust_aise_code_output");
    assert_eq!(fs::read_to_string(out.join("src_a.rs.rs")).unwrap(), "fn a() {}");
}

#[tokio::test]
async fn test_truncated_content_cell_is_not_written() {
    let server = MockServer::start().await;
    let body = json!({
        "features": [
            {"feature_idx": 0, "name": "blob_id", "type": {"dtype": "string", "_type": "Value"}},
            {"feature_idx": 1, "name": "content", "type": {"dtype": "string", "_type": "Value"}}
        ],
        "rows": [
            {"row_idx": 0, "row": {"blob_id": "t1", "content": "fn main() { let x = 1"}, "truncated_cells": ["content"]},
            {"row_idx": 1, "row": {"blob_id": "t2", "content": "fn main() {}"}, "truncated_cells": []}
        ],
        "num_rows_total": 2
    });
    Mock::given(method("GET"))
        .and(path("/rows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let config = hf_config(&server);
    let client = config.http_client().unwrap();
    let aise = SubsetRef {
        dataset: "AISE-TUDelft/the-stack-v2".to_string(),
        config: "Rust_Files".to_string(),
        split: "train".to_string(),
    };
    let mut source = DatasetsServerSource::open(client, config, aise).await.unwrap();

    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("rust_aise_code_output");
    let options = IngestOptions {
        limit: NonZeroUsize::new(5).unwrap(),
        log_path: tmp.path().join("rust_aise_samples.jsonl"),
        split: Some(SplitTarget {
            dir: out.clone(),
            extension: ".rs".to_string(),
        }),
    };

    let summary = run_ingest(&mut source, None, &options, &mut ()).await.unwrap();

    assert_eq!(summary.written, 1);
    assert_eq!(summary.skipped, 1);
    assert!(!out.join("t1.rs").exists());
    assert_eq!(fs::read_to_string(out.join("t2.rs")).unwrap(), "fn main() {}");
    let log = fs::read_to_string(&options.log_path).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(!log.contains("t1"));
}

// ============================================================================
// Source failures
// ============================================================================

#[tokio::test]
async fn test_unknown_subset_fails_at_open() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rows"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "The config does not exist."})),
        )
        .mount(&server)
        .await;

    let config = hf_config(&server);
    let client = config.http_client().unwrap();
    let err = DatasetsServerSource::open(client, config, subset())
        .await
        .err()
        .unwrap();

    match err {
        StackError::SubsetNotFound { dataset, config, reason } => {
            assert_eq!(dataset, DATASET);
            assert_eq!(config, "Python");
            assert!(reason.contains("404"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_mid_stream_failure_is_fatal() {
    let server = MockServer::start().await;
    mount_page(&server, 0, page(vec![meta_row(0, "b1"), meta_row(1, "b2")], 4), 1).await;
    Mock::given(method("GET"))
        .and(path("/rows"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream timeout"))
        .mount(&server)
        .await;

    let config = hf_config(&server);
    let client = config.http_client().unwrap();
    let mut source = DatasetsServerSource::open(client, config, subset()).await.unwrap();

    assert!(source.next_row().await.unwrap().is_some());
    assert!(source.next_row().await.unwrap().is_some());
    let err = source.next_row().await.unwrap_err();
    assert!(matches!(err, StackError::Source(ref msg) if msg.contains("500")));
}

// ============================================================================
// Extraction
// ============================================================================

#[tokio::test]
async fn test_unsplit_log_extracts_to_same_files() {
    let server = MockServer::start().await;
    mount_page(&server, 0, page(vec![meta_row(0, "b1"), meta_row(1, "b2")], 2), 1).await;

    let config = hf_config(&server);
    let client = config.http_client().unwrap();
    let mut source = DatasetsServerSource::open(client, config, subset()).await.unwrap();
    let resolver = MapResolver::new()
        .with_blob("b1", "x = 1\n")
        .with_blob("b2", "y = 2\n");

    let tmp = TempDir::new().unwrap();
    let options = IngestOptions {
        limit: NonZeroUsize::new(2).unwrap(),
        log_path: tmp.path().join("python_samples.jsonl"),
        split: None,
    };
    run_ingest(&mut source, Some(&resolver), &options, &mut ())
        .await
        .unwrap();

    let out = tmp.path().join("extracted");
    let summary = extract_samples(&options.log_path, &out, ".py").unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(fs::read_to_string(out.join("b1.py")).unwrap(), "x = 1\n");
    assert_eq!(fs::read_to_string(out.join("b2.py")).unwrap(), "y = 2\n");
}
