//! End-to-end pipeline integration tests
//!
//! Tests the complete workflow:
//! 1. Freebase dump and Wikidata site-link extraction
//! 2. Merge-join and cleanse
//! 3. Coverage statistics
//! 4. All four matchers
//! 5. TSV export and run report

use sameas::config::{Config, StorageBackend};
use sameas::join::JoinMode;
use sameas::pipeline::{Pipeline, ORIGIN_TABLE, WIKIDATA_TABLE};
use tempfile::TempDir;

use crate::common::{
    pairs, read_tsv, sample_freebase_dump, sample_site_links, write_freebase_dump,
    write_wikidata_db,
};

fn sample_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.workspace_dir = dir.path().join("workspace");
    config.paths.output_dir = dir.path().join("output");
    config.sources.freebase_dump = Some(write_freebase_dump(dir.path(), &sample_freebase_dump()));
    config.sources.wikidata_db = Some(write_wikidata_db(dir.path(), &sample_site_links()));
    config.pipeline.page_size = 3;
    config
}

fn all_pairs() -> Vec<(String, String)> {
    pairs(&[
        ("m.berlin", "Q64"),
        ("m.cafe", "Q1"),
        ("m.obama", "Q76"),
        ("m.split", "Q1663"),
        ("m.split", "Q9999"),
    ])
}

fn confident_pairs() -> Vec<(String, String)> {
    pairs(&[("m.berlin", "Q64"), ("m.cafe", "Q1"), ("m.obama", "Q76")])
}

// ============================================================================
// Complete Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_full_run_writes_exports() {
    let dir = TempDir::new().unwrap();
    let config = sample_config(&dir);
    let output = config.paths.output_dir.clone();

    let report = Pipeline::new(config).unwrap().run(&[], true).await.unwrap();

    let freebase = report.freebase_extract.unwrap();
    assert_eq!(freebase.scanned, 11);
    assert_eq!(freebase.extracted, 8);
    assert_eq!(freebase.skipped, 2);
    let wikidata = report.wikidata_extract.unwrap();
    assert_eq!(wikidata.scanned, 11);
    assert_eq!(wikidata.extracted, 10);

    assert_eq!(report.join.unwrap().pairs, 8);
    assert_eq!(report.cleanse.unwrap().pairs, 5);

    assert_eq!(read_tsv(&output.join("origin.tsv")), all_pairs());
    // the two Split items tie on one shared edition each
    assert_eq!(read_tsv(&output.join("max_conf.tsv")), all_pairs());
    assert_eq!(read_tsv(&output.join("threshold.tsv")), confident_pairs());
    assert_eq!(read_tsv(&output.join("one2one.tsv")), confident_pairs());
    assert_eq!(read_tsv(&output.join("belief.tsv")), all_pairs());
}

#[tokio::test]
async fn test_report_json_written() {
    let dir = TempDir::new().unwrap();
    let config = sample_config(&dir);
    let report_path = config.paths.output_dir.join("report.json");

    let report = Pipeline::new(config).unwrap().run(&[], true).await.unwrap();
    assert_eq!(report.stages.len(), 12);
    assert!(report.finished_at.is_some());

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(json["run_id"], report.run_id.to_string());
    assert_eq!(json["join_mode"], "fan_out");
    assert_eq!(json["matchers"].as_array().unwrap().len(), 4);
    assert_eq!(json["exports"].as_array().unwrap().len(), 5);

    let threshold = json["matchers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["matcher"] == "threshold")
        .unwrap();
    assert_eq!(threshold["pairs"], 3);
    assert_eq!(threshold["steps"][0]["table"], "threshold_raw");
}

#[tokio::test]
async fn test_rerun_without_ingest() {
    let dir = TempDir::new().unwrap();
    let config = sample_config(&dir);
    let output = config.paths.output_dir.clone();

    Pipeline::new(config.clone()).unwrap().run(&[], true).await.unwrap();
    let first = read_tsv(&output.join("max_conf.tsv"));

    // source tables persist in the workspace between runs
    let report = Pipeline::new(config)
        .unwrap()
        .run(&["maxconf".to_string()], false)
        .await
        .unwrap();
    assert!(report.freebase_extract.is_none());
    assert!(report.stage("ingest_freebase").is_none());
    assert_eq!(read_tsv(&output.join("max_conf.tsv")), first);
    assert!(dir.path().join("workspace/freebase.db").exists());
}

#[tokio::test]
async fn test_stage_by_stage_matches_full_run() {
    let dir = TempDir::new().unwrap();
    let config = sample_config(&dir);
    let output = config.paths.output_dir.clone();
    let pipeline = Pipeline::new(config).unwrap();
    let strategies = vec!["oneonly".to_string()];

    let mut report = pipeline.new_report(&strategies);
    pipeline.ingest(&mut report).await.unwrap();
    pipeline.join(&mut report).await.unwrap();
    pipeline.stats(&mut report).await.unwrap();
    pipeline.run_matchers(&strategies, &mut report).await.unwrap();
    pipeline.export(&strategies, &mut report).await.unwrap();

    assert_eq!(read_tsv(&output.join("one2one.tsv")), confident_pairs());
    assert!(!output.join("belief.tsv").exists());
    assert_eq!(report.exports.len(), 2);
}

#[tokio::test]
async fn test_summary_after_run() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(sample_config(&dir)).unwrap();
    pipeline.run(&[], true).await.unwrap();

    let summary = pipeline.summary().await.unwrap();
    let freebase = summary.iter().find(|s| s.table == "freebase").unwrap();
    assert_eq!(freebase.rows, 8);
    assert_eq!(freebase.freebase_entities, Some(4));

    let wikidata = summary.iter().find(|s| s.table == WIKIDATA_TABLE).unwrap();
    assert_eq!(wikidata.rows, 10);
    assert_eq!(wikidata.wikidata_entities, Some(5));

    let origin = summary.iter().find(|s| s.table == ORIGIN_TABLE).unwrap();
    assert_eq!(origin.rows, 5);
    assert_eq!(origin.freebase_entities, Some(4));
    assert_eq!(origin.wikidata_entities, Some(5));

    let belief = summary.iter().find(|s| s.table == "belief").unwrap();
    assert_eq!(belief.rows, 5);
}

// ============================================================================
// Join Mode and Backend Tests
// ============================================================================

#[tokio::test]
async fn test_advance_one_drops_duplicate_wikidata_rows() {
    let mut links = sample_site_links();
    // a second item claiming the English Berlin article
    links.push((77, "enwiki", "Berlin"));

    let mut raw_counts = Vec::new();
    let mut origins = Vec::new();
    for mode in [JoinMode::FanOut, JoinMode::AdvanceOne] {
        let dir = TempDir::new().unwrap();
        let mut config = sample_config(&dir);
        config.sources.wikidata_db = Some(write_wikidata_db(dir.path(), &links));
        config.pipeline.join_mode = mode;
        let output = config.paths.output_dir.clone();

        let report = Pipeline::new(config).unwrap().run(&[], true).await.unwrap();
        raw_counts.push(report.join.unwrap().pairs);
        origins.push(read_tsv(&output.join("origin.tsv")));
    }

    assert_eq!(raw_counts, vec![9, 8]);
    assert!(origins[0].contains(&(crate::common::fb("m.berlin"), crate::common::wd("Q77"))));
    assert_eq!(origins[1], all_pairs());
}

#[tokio::test]
async fn test_memory_backend_matches_sqlite() {
    let mut exports = Vec::new();
    for backend in [StorageBackend::Sqlite, StorageBackend::Memory] {
        let dir = TempDir::new().unwrap();
        let mut config = sample_config(&dir);
        config.paths.storage = backend;
        let output = config.paths.output_dir.clone();

        Pipeline::new(config).unwrap().run(&[], true).await.unwrap();
        let files: Vec<_> = ["origin.tsv", "max_conf.tsv", "threshold.tsv", "one2one.tsv", "belief.tsv"]
            .iter()
            .map(|f| read_tsv(&output.join(f)))
            .collect();
        exports.push(files);
    }
    assert_eq!(exports[0], exports[1]);
}

#[tokio::test]
async fn test_sequential_matchers() {
    let dir = TempDir::new().unwrap();
    let mut config = sample_config(&dir);
    config.pipeline.parallel_matchers = false;
    config.pipeline.page_size = 1;
    let output = config.paths.output_dir.clone();

    let report = Pipeline::new(config).unwrap().run(&[], true).await.unwrap();
    let names: Vec<_> = report.matchers.iter().map(|m| m.matcher.as_str()).collect();
    assert_eq!(names, vec!["maxconf", "threshold", "oneonly", "belief"]);
    assert_eq!(read_tsv(&output.join("threshold.tsv")), confident_pairs());
}
