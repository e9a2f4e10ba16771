//! Error scenario integration tests
//!
//! Tests various failure modes and error handling:
//! 1. Configuration errors caught before any stage runs
//! 2. Unreadable source inputs
//! 3. Stage tables from different runs
//! 4. Partial batch failures under both failure policies

use sameas::config::Config;
use sameas::error::{Error, ErrorCategory, SameAsErrorTrait};
use sameas::models::{CleansedPair, Side, SourceRow};
use sameas::pipeline::{Pipeline, WIKIDATA_TABLE};
use sameas::storage::{BatchSink, FailurePolicy, SortedTable, SqliteTable};
use tempfile::TempDir;

use crate::common::{
    sample_freebase_dump, sample_site_links, write_freebase_dump, write_wikidata_db,
};

fn sample_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.workspace_dir = dir.path().join("workspace");
    config.paths.output_dir = dir.path().join("output");
    config.sources.freebase_dump = Some(write_freebase_dump(dir.path(), &sample_freebase_dump()));
    config.sources.wikidata_db = Some(write_wikidata_db(dir.path(), &sample_site_links()));
    config.pipeline.page_size = 4;
    config
}

fn cleansed(fb: &str, wd: &str) -> CleansedPair {
    CleansedPair {
        fb_id: fb.to_string(),
        wd_id: wd.to_string(),
        shared_lang_count: 1,
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

#[tokio::test]
async fn test_missing_dump_fails_before_stages() {
    let dir = TempDir::new().unwrap();
    let mut config = sample_config(&dir);
    config.sources.freebase_dump = Some(dir.path().join("missing.nt"));
    let output = config.paths.output_dir.clone();

    let err = Pipeline::new(config).unwrap().run(&[], true).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.category(), ErrorCategory::Config);
    assert!(!err.is_recoverable());
    assert!(!output.join("report.json").exists());
}

#[test]
fn test_unknown_strategy_rejected_by_validation() {
    let dir = TempDir::new().unwrap();
    let mut config = sample_config(&dir);
    config.pipeline.strategies = vec!["maxconf".to_string(), "jaccard".to_string()];

    let err = Pipeline::new(config).unwrap_err();
    match err {
        Error::UnknownMatcher { name, valid } => {
            assert_eq!(name, "jaccard");
            assert_eq!(valid, vec!["maxconf", "threshold", "oneonly", "belief"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_out_of_range_threshold_in_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sameas.toml");
    std::fs::write(&path, "[pipeline]\nthreshold = 1.5\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.pipeline.threshold, 1.5);
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

// ============================================================================
// Source and Stage Errors
// ============================================================================

#[tokio::test]
async fn test_corrupt_wikidata_db_names_stage() {
    let dir = TempDir::new().unwrap();
    let config = sample_config(&dir);
    let db = config.sources.wikidata_db.clone().unwrap();
    std::fs::write(&db, "not a sqlite database\n".repeat(200)).unwrap();

    let err = Pipeline::new(config).unwrap().run(&[], true).await.unwrap_err();
    assert_eq!(err.stage(), Some("ingest_wikidata"));
    assert_eq!(err.category(), ErrorCategory::Storage);
}

#[tokio::test]
async fn test_stale_coverage_is_reported() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(sample_config(&dir)).unwrap();
    pipeline.run(&[], true).await.unwrap();

    // replace the Wikidata source so it no longer covers the cleansed pairs
    let wikidata = pipeline
        .workspace()
        .fresh_table::<SourceRow>(WIKIDATA_TABLE)
        .unwrap();
    wikidata
        .insert_batch(&[sameas::extract::source_row(
            "http://www.wikidata.org/wiki/Q76",
            "en",
            "Barack Obama",
        )])
        .unwrap();

    let mut report = pipeline.new_report(&[]);
    let err = pipeline.stats(&mut report).await.unwrap_err();
    assert_eq!(err.stage(), Some("pair_stats"));
    assert_eq!(err.category(), ErrorCategory::Precondition);
    match err {
        Error::Stage { source, .. } => {
            assert!(matches!(*source, Error::MissingCoverage { side: Side::Wikidata, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Batch Failure Policy
// ============================================================================

#[test]
fn test_duplicate_pair_aborts() {
    let dir = TempDir::new().unwrap();
    let table: SqliteTable<CleansedPair> =
        SqliteTable::open(dir.path().join("origin.db"), "origin").unwrap();
    table.insert_batch(&[cleansed("F1", "W1")]).unwrap();

    let mut sink = BatchSink::<CleansedPair>::new(&table, FailurePolicy::Abort);
    let err = sink
        .write(&[cleansed("F1", "W2"), cleansed("F1", "W1")])
        .unwrap_err();
    match err {
        Error::BatchRejected { table, failed } => {
            assert_eq!(table, "origin");
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].index, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_pair_skipped() {
    let dir = TempDir::new().unwrap();
    let table: SqliteTable<CleansedPair> =
        SqliteTable::open(dir.path().join("origin.db"), "origin").unwrap();

    let mut sink = BatchSink::<CleansedPair>::new(&table, FailurePolicy::Skip);
    sink.write(&[cleansed("F1", "W1"), cleansed("F1", "W1"), cleansed("F2", "W1")])
        .unwrap();
    assert_eq!(sink.written(), 2);
    assert_eq!(sink.rejected(), 1);
    assert_eq!(table.count().unwrap(), 2);
}
