//! Dedup/Cleanser
//!
//! Collapses the raw join into one [`CleansedPair`] per distinct
//! `(fb_id, wd_id)`. The raw relation holds one row per matching language
//! edition, so a pair that shares five articles shows up five times; the
//! number of distinct shared editions is kept as `shared_lang_count`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::Result;
use crate::models::{CleansedPair, RawPair};
use crate::storage::{group_into, BatchSink, FailurePolicy, SortedTable};

const RAW_ORDER: &[&str] = &["fb_id", "wd_id"];

/// Counters for one cleanse run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanseStats {
    pub raw_rows: u64,
    pub freebase_entities: u64,
    pub pairs: u64,
    pub rejected: u64,
}

/// Collapse the raw pairs of one Freebase entity
///
/// A pair's shared count is the smaller of its distinct Freebase and
/// Wikidata editions, so one edition can never be counted twice on a side.
pub fn collapse_group(group: &[RawPair], out: &mut Vec<CleansedPair>) {
    let mut by_wd: BTreeMap<&str, (BTreeSet<&str>, BTreeSet<&str>)> = BTreeMap::new();
    for raw in group {
        let (fb_langs, wd_langs) = by_wd.entry(raw.wd_id.as_str()).or_default();
        fb_langs.insert(raw.fb_lang.as_str());
        wd_langs.insert(raw.wd_lang.as_str());
    }

    for (wd_id, (fb_langs, wd_langs)) in by_wd {
        let shared = fb_langs.len().min(wd_langs.len());
        out.push(CleansedPair {
            fb_id: group[0].fb_id.clone(),
            wd_id: wd_id.to_string(),
            shared_lang_count: u32::try_from(shared).unwrap_or(u32::MAX),
        });
    }
}

/// Streams the raw relation into the cleansed relation
#[derive(Debug, Clone)]
pub struct Cleanser {
    page_size: usize,
    policy: FailurePolicy,
}

impl Cleanser {
    pub fn new(page_size: usize, policy: FailurePolicy) -> Self {
        Self { page_size, policy }
    }

    pub fn cleanse(
        &self,
        raw: &dyn SortedTable<RawPair>,
        output: &dyn SortedTable<CleansedPair>,
    ) -> Result<CleanseStats> {
        let mut sink = BatchSink::new(output, self.policy);
        let grouped = group_into(
            raw,
            RAW_ORDER,
            self.page_size,
            |r: &RawPair| r.fb_id.as_str(),
            collapse_group,
            &mut sink,
        )?;

        let stats = CleanseStats {
            raw_rows: grouped.rows,
            freebase_entities: grouped.groups,
            pairs: sink.written(),
            rejected: sink.rejected(),
        };
        tracing::info!(
            raw_rows = stats.raw_rows,
            freebase_entities = stats.freebase_entities,
            pairs = stats.pairs,
            "Cleanse complete"
        );
        Ok(stats)
    }
}
