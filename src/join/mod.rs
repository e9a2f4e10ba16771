//! Raw Joiner
//!
//! Sorted merge-join of the Freebase and Wikidata source tables on
//! `url_hash`. Both inputs are scanned page by page in hash order; every
//! Freebase row is paired with every Wikidata row carrying the same hash.
//!
//! ```text
//!   freebase (by url_hash)      wikidata (by url_hash)
//!          │                            │
//!          └────────► compare ◄─────────┘
//!                  <  advance fb
//!                  >  advance wd
//!                  =  emit RawPair(s)
//!                        │
//!                        ▼
//!                  raw (RawPair)
//! ```
//!
//! Output is flushed whenever either input loads a new page, which keeps the
//! in-memory buffer bounded by the page size.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{RawPair, SourceRow};
use crate::storage::{Advance, BatchSink, FailurePolicy, RowCursor, SortedTable};

const HASH_ORDER: &[&str] = &["url_hash"];

/// Behaviour on equal hashes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Pair the whole run of Freebase rows with the whole run of Wikidata
    /// rows sharing a hash (cross product)
    #[default]
    FanOut,
    /// Emit one pair and advance only the Freebase side; Wikidata rows after
    /// the first of a run are only reached once the Freebase run is exhausted
    AdvanceOne,
}

impl JoinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FanOut => "fan_out",
            Self::AdvanceOne => "advance_one",
        }
    }
}

impl std::str::FromStr for JoinMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fan_out" | "fanout" => Ok(Self::FanOut),
            "advance_one" => Ok(Self::AdvanceOne),
            other => Err(Error::config(format!(
                "Invalid join mode '{other}'. Valid options: fan_out, advance_one"
            ))),
        }
    }
}

/// Counters for one join run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    pub pairs: u64,
    pub rejected: u64,
    pub flushes: u64,
}

struct JoinOutput<'a> {
    sink: BatchSink<'a, RawPair>,
    pending: Vec<RawPair>,
    flush_at: usize,
    flushes: u64,
}

impl JoinOutput<'_> {
    fn push(&mut self, fb: &SourceRow, wd: &SourceRow) -> Result<()> {
        self.pending.push(RawPair::from_rows(fb, wd));
        if self.pending.len() >= self.flush_at {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.sink.write(&self.pending)?;
        self.pending.clear();
        self.flushes += 1;
        Ok(())
    }

    fn advance(&mut self, cursor: &mut RowCursor<'_, SourceRow>) -> Result<()> {
        if cursor.advance()? == Advance::NewPage {
            self.flush()?;
        }
        Ok(())
    }
}

/// Merge-joins two hash-sorted source tables into raw pairs
#[derive(Debug, Clone)]
pub struct RawJoiner {
    mode: JoinMode,
    page_size: usize,
    policy: FailurePolicy,
}

impl RawJoiner {
    pub fn new(mode: JoinMode, page_size: usize, policy: FailurePolicy) -> Self {
        Self {
            mode,
            page_size: page_size.max(1),
            policy,
        }
    }

    pub fn mode(&self) -> JoinMode {
        self.mode
    }

    pub fn join(
        &self,
        freebase: &dyn SortedTable<SourceRow>,
        wikidata: &dyn SortedTable<SourceRow>,
        output: &dyn SortedTable<RawPair>,
    ) -> Result<JoinStats> {
        let mut fb = RowCursor::open(freebase, HASH_ORDER, self.page_size)?;
        let mut wd = RowCursor::open(wikidata, HASH_ORDER, self.page_size)?;
        let mut out = JoinOutput {
            sink: BatchSink::new(output, self.policy),
            pending: Vec::new(),
            flush_at: self.page_size,
            flushes: 0,
        };

        while let (Some(f), Some(w)) = (fb.peek(), wd.peek()) {
            match f.url_hash.cmp(&w.url_hash) {
                Ordering::Less => out.advance(&mut fb)?,
                Ordering::Greater => out.advance(&mut wd)?,
                Ordering::Equal => match self.mode {
                    JoinMode::AdvanceOne => {
                        out.push(f, w)?;
                        out.advance(&mut fb)?;
                    }
                    JoinMode::FanOut => {
                        let hash = f.url_hash.clone();
                        let mut run: Vec<SourceRow> = Vec::new();
                        while let Some(w) = wd.peek().filter(|w| w.url_hash == hash) {
                            run.push(w.clone());
                            out.advance(&mut wd)?;
                        }
                        while let Some(f) = fb.peek().filter(|f| f.url_hash == hash) {
                            for w in &run {
                                out.push(f, w)?;
                            }
                            out.advance(&mut fb)?;
                        }
                    }
                },
            }
        }
        out.flush()?;

        let stats = JoinStats {
            pairs: out.sink.written(),
            rejected: out.sink.rejected(),
            flushes: out.flushes,
        };
        tracing::info!(
            mode = self.mode.as_str(),
            pairs = stats.pairs,
            flushes = stats.flushes,
            "Raw join complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryTable, SqliteTable};

    fn row(id: &str, lang: &str, hash: &str) -> SourceRow {
        SourceRow::new(id, format!("http://{lang}.wikipedia.org/wiki/{hash}"), lang, hash)
    }

    fn run_join(
        fb_rows: &[SourceRow],
        wd_rows: &[SourceRow],
        mode: JoinMode,
        page_size: usize,
    ) -> Vec<(String, String)> {
        let fb: MemoryTable<SourceRow> = MemoryTable::new("freebase");
        let wd: MemoryTable<SourceRow> = MemoryTable::new("wikidata");
        fb.insert_batch(fb_rows).unwrap();
        wd.insert_batch(wd_rows).unwrap();
        let raw: SqliteTable<RawPair> = SqliteTable::in_memory("raw").unwrap();

        RawJoiner::new(mode, page_size, FailurePolicy::Abort)
            .join(&fb, &wd, &raw)
            .unwrap();

        let mut pairs: Vec<_> = raw
            .scan_sorted(&["fb_id", "wd_id"], 1000, None)
            .unwrap()
            .rows
            .into_iter()
            .map(|p| (p.fb_id, p.wd_id))
            .collect();
        pairs.sort();
        pairs
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(f, w)| (f.to_string(), w.to_string()))
            .collect()
    }

    #[test]
    fn test_example_scenario() {
        let fb = [row("F1", "en", "H1"), row("F1", "fr", "H2")];
        let wd = [
            row("W1", "en", "H1"),
            row("W2", "fr", "H2"),
            row("W2", "de", "H3"),
        ];
        for mode in [JoinMode::FanOut, JoinMode::AdvanceOne] {
            for page_size in [1, 2, 100] {
                assert_eq!(
                    run_join(&fb, &wd, mode, page_size),
                    pairs(&[("F1", "W1"), ("F1", "W2")])
                );
            }
        }
    }

    #[test]
    fn test_fan_out_cross_product() {
        let fb = [row("F1", "en", "H1"), row("F2", "en", "H1"), row("F3", "en", "H9")];
        let wd = [row("W1", "en", "H1"), row("W2", "en", "H1")];
        for page_size in [1, 3, 100] {
            assert_eq!(
                run_join(&fb, &wd, JoinMode::FanOut, page_size),
                pairs(&[("F1", "W1"), ("F1", "W2"), ("F2", "W1"), ("F2", "W2")])
            );
        }
    }

    #[test]
    fn test_advance_one_under_counts_shared_runs() {
        let fb = [row("F1", "en", "H1"), row("F2", "en", "H1")];
        let wd = [row("W1", "en", "H1"), row("W2", "en", "H1")];
        // only the Freebase cursor moves on a match, so W2 is never reached
        assert_eq!(
            run_join(&fb, &wd, JoinMode::AdvanceOne, 10),
            pairs(&[("F1", "W1"), ("F2", "W1")])
        );
    }

    #[test]
    fn test_advance_one_single_freebase_row() {
        let fb = [row("F1", "en", "H1"), row("F2", "en", "H2")];
        let wd = [row("W1", "en", "H1"), row("W2", "en", "H1"), row("W3", "en", "H2")];
        assert_eq!(
            run_join(&fb, &wd, JoinMode::AdvanceOne, 1),
            pairs(&[("F1", "W1"), ("F2", "W3")])
        );
    }

    #[test]
    fn test_empty_side_yields_nothing() {
        let fb = [row("F1", "en", "H1")];
        assert!(run_join(&fb, &[], JoinMode::FanOut, 5).is_empty());
        assert!(run_join(&[], &fb, JoinMode::AdvanceOne, 5).is_empty());
    }

    #[test]
    fn test_join_mode_from_str() {
        assert_eq!("advance_one".parse::<JoinMode>().unwrap(), JoinMode::AdvanceOne);
        assert_eq!("fan_out".parse::<JoinMode>().unwrap(), JoinMode::FanOut);
        assert!("zip".parse::<JoinMode>().is_err());
    }
}
