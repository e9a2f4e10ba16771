//! Common test utilities

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use sameas::cleanse::Cleanser;
use sameas::coverage::CoverageBuilder;
use sameas::join::{JoinMode, RawJoiner};
use sameas::matcher::{MatchContext, MatchSettings};
use sameas::models::{CleansedPair, EntityCoverage, MatchedPair, PairStat, RawPair, Side, SourceRow};
use sameas::pipeline::{
    FREEBASE_TABLE, ORIGIN_TABLE, RAW_TABLE, STAT_FREEBASE_TABLE, STAT_PAIRS_TABLE,
    STAT_WIKIDATA_TABLE, WIKIDATA_TABLE,
};
use sameas::storage::{FailurePolicy, PageReader, Record, SortedTable, Workspace};

pub const FB_PREFIX: &str = "http://rdf.freebase.com/ns/";
pub const WD_PREFIX: &str = "http://www.wikidata.org/wiki/";

pub fn fb(mid: &str) -> String {
    format!("{FB_PREFIX}{mid}")
}

pub fn wd(qid: &str) -> String {
    format!("{WD_PREFIX}{qid}")
}

/// A `type.object.key` triple linking `mid` to a Wikipedia article
pub fn freebase_key_line(mid: &str, lang: &str, key: &str) -> String {
    format!(
        "<{FB_PREFIX}{mid}>\t<{FB_PREFIX}type.object.key>\t\"/wikipedia/{lang}_title/{key}\"\t."
    )
}

/// Small dump covering a clean match, a partial match, an escaped key and
/// one Freebase topic whose keys land on two Wikidata items
pub fn sample_freebase_dump() -> Vec<String> {
    vec![
        freebase_key_line("m.obama", "en", "Barack_Obama"),
        freebase_key_line("m.obama", "fr", "Barack_Obama"),
        freebase_key_line("m.obama", "de", "Barack_Obama"),
        format!("<{FB_PREFIX}m.obama>\t<{FB_PREFIX}type.object.name>\t\"Barack Obama\"@en\t."),
        freebase_key_line("m.berlin", "en", "Berlin"),
        freebase_key_line("m.berlin", "de", "Berlin"),
        freebase_key_line("m.cafe", "en", "Caf$00E9"),
        freebase_key_line("m.split", "en", "Split_$0028city$0029"),
        freebase_key_line("m.split", "fr", "Split_$0028ville$0029"),
        format!("<{FB_PREFIX}m.broken>\t<{FB_PREFIX}type.object.key>\t\"/wikipedia/en_title/Bad$00\"\t."),
        "not a triple".to_string(),
    ]
}

/// `(item_id, site_id, site_page)` rows matching [`sample_freebase_dump`]
pub fn sample_site_links() -> Vec<(i64, &'static str, &'static str)> {
    vec![
        (76, "enwiki", "Barack Obama"),
        (76, "frwiki", "Barack Obama"),
        (76, "dewiki", "Barack Obama"),
        (76, "eswiki", "Barack Obama"),
        (76, "enwikiquote", "Barack Obama"),
        (64, "enwiki", "Berlin"),
        (64, "dewiki", "Berlin"),
        (64, "frwiki", "Berlin"),
        (1, "enwiki", "Café"),
        (1663, "enwiki", "Split (city)"),
        (9999, "frwiki", "Split (ville)"),
    ]
}

pub fn write_freebase_dump(dir: &Path, lines: &[String]) -> PathBuf {
    let path = dir.join("freebase.nt");
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&path, content).unwrap();
    path
}

pub fn write_wikidata_db(dir: &Path, links: &[(i64, &str, &str)]) -> PathBuf {
    let path = dir.join("wikidata.db");
    if path.exists() {
        std::fs::remove_file(&path).unwrap();
    }
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE wb_items_per_site (
             ips_row_id INTEGER PRIMARY KEY,
             ips_item_id INTEGER NOT NULL,
             ips_site_id BLOB NOT NULL,
             ips_site_page BLOB NOT NULL
         );",
    )
    .unwrap();
    for (item, site, page) in links {
        conn.execute(
            "INSERT INTO wb_items_per_site (ips_item_id, ips_site_id, ips_site_page)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![item, site.as_bytes(), page.as_bytes()],
        )
        .unwrap();
    }
    path
}

/// Lines of a TSV export as `(fb, wd)` pairs, in file order
pub fn read_tsv(path: &Path) -> Vec<(String, String)> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let (fb, wd) = line.split_once('\t').unwrap();
            (fb.to_string(), wd.to_string())
        })
        .collect()
}

pub fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut pairs: Vec<_> = expected
        .iter()
        .map(|(f, w)| (fb(f), wd(w)))
        .collect();
    pairs.sort();
    pairs
}

/// All rows of a table in `keys` order
pub fn scan_all<R: Record>(table: &dyn SortedTable<R>, keys: &[&str]) -> Vec<R> {
    let mut reader = PageReader::new(table, keys, 1000);
    let mut rows = Vec::new();
    while let Some(page) = reader.next_page().unwrap() {
        rows.extend(page);
    }
    rows
}

pub fn matched_pairs(table: &dyn SortedTable<MatchedPair>) -> Vec<(String, String)> {
    scan_all(table, &["fb_id", "wd_id"])
        .into_iter()
        .map(|p| (p.fb_id, p.wd_id))
        .collect()
}

/// Run join, cleanse and both coverage passes synchronously on `workspace`
pub fn build_stats(workspace: &Workspace, mode: JoinMode, page_size: usize) -> MatchContext {
    let policy = FailurePolicy::Abort;
    let freebase = workspace.table::<SourceRow>(FREEBASE_TABLE).unwrap();
    let wikidata = workspace.table::<SourceRow>(WIKIDATA_TABLE).unwrap();
    let raw = workspace.fresh_table::<RawPair>(RAW_TABLE).unwrap();
    RawJoiner::new(mode, page_size, policy)
        .join(freebase.as_ref(), wikidata.as_ref(), raw.as_ref())
        .unwrap();

    let origin = workspace.fresh_table::<CleansedPair>(ORIGIN_TABLE).unwrap();
    Cleanser::new(page_size, policy)
        .cleanse(raw.as_ref(), origin.as_ref())
        .unwrap();

    let builder = CoverageBuilder::new(page_size, policy);
    let stat_fb = workspace.fresh_table::<EntityCoverage>(STAT_FREEBASE_TABLE).unwrap();
    builder
        .entity_coverage(Side::Freebase, freebase.as_ref(), stat_fb.as_ref())
        .unwrap();
    let stat_wd = workspace.fresh_table::<EntityCoverage>(STAT_WIKIDATA_TABLE).unwrap();
    builder
        .entity_coverage(Side::Wikidata, wikidata.as_ref(), stat_wd.as_ref())
        .unwrap();

    let stats: Arc<dyn SortedTable<PairStat>> =
        workspace.fresh_table::<PairStat>(STAT_PAIRS_TABLE).unwrap();
    builder
        .pair_stats(origin.as_ref(), stat_fb.as_ref(), stat_wd.as_ref(), stats.as_ref())
        .unwrap();

    MatchContext::new(
        stats,
        workspace.clone(),
        MatchSettings {
            page_size,
            ..MatchSettings::default()
        },
    )
}

/// Seed an in-memory workspace with source rows
pub fn memory_workspace(freebase: &[SourceRow], wikidata: &[SourceRow]) -> Workspace {
    let workspace = Workspace::in_memory();
    workspace
        .table::<SourceRow>(FREEBASE_TABLE)
        .unwrap()
        .insert_batch(freebase)
        .unwrap();
    workspace
        .table::<SourceRow>(WIKIDATA_TABLE)
        .unwrap()
        .insert_batch(wikidata)
        .unwrap();
    workspace
}
