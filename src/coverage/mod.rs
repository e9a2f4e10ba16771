//! Coverage Stat Builder
//!
//! Two passes:
//!
//! 1. [`CoverageBuilder::entity_coverage`] groups a source table by entity and
//!    counts the distinct language editions each entity links to.
//! 2. [`CoverageBuilder::pair_stats`] walks the cleansed relation and attaches
//!    both sides' coverage to every pair via point lookups.
//!
//! A cleansed pair whose entity has no coverage row means the stage tables
//! come from different runs; that is reported as
//! [`Error::MissingCoverage`] instead of producing a partial relation.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{CleansedPair, EntityCoverage, PairStat, Side, SourceRow};
use crate::storage::{group_into, BatchSink, FailurePolicy, Field, PageReader, SortedTable};

const ENTITY_ORDER: &[&str] = &["entity_id", "lang"];
const PAIR_ORDER: &[&str] = &["fb_id", "wd_id"];

/// Counters for one coverage pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoverageStats {
    pub source_rows: u64,
    pub entities: u64,
}

/// Counters for the pair-stat pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairStatStats {
    pub pairs: u64,
    pub lookups: u64,
}

/// Distinct editions in one entity's rows (sorted by language)
fn distinct_langs(group: &[SourceRow]) -> u32 {
    let mut count = 0u32;
    let mut last: Option<&str> = None;
    for row in group {
        if last != Some(row.lang.as_str()) {
            count += 1;
            last = Some(row.lang.as_str());
        }
    }
    count
}

#[derive(Debug, Clone)]
pub struct CoverageBuilder {
    page_size: usize,
    policy: FailurePolicy,
}

impl CoverageBuilder {
    pub fn new(page_size: usize, policy: FailurePolicy) -> Self {
        Self { page_size, policy }
    }

    /// One [`EntityCoverage`] row per distinct entity of `source`
    pub fn entity_coverage(
        &self,
        side: Side,
        source: &dyn SortedTable<SourceRow>,
        output: &dyn SortedTable<EntityCoverage>,
    ) -> Result<CoverageStats> {
        let mut sink = BatchSink::new(output, self.policy);
        let grouped = group_into(
            source,
            ENTITY_ORDER,
            self.page_size,
            |r: &SourceRow| r.entity_id.as_str(),
            |group, out: &mut Vec<EntityCoverage>| {
                out.push(EntityCoverage {
                    entity_id: group[0].entity_id.clone(),
                    lang_count: distinct_langs(group),
                });
            },
            &mut sink,
        )?;

        let stats = CoverageStats {
            source_rows: grouped.rows,
            entities: sink.written(),
        };
        tracing::info!(
            side = %side,
            source_rows = stats.source_rows,
            entities = stats.entities,
            "Entity coverage computed"
        );
        Ok(stats)
    }

    /// Join every cleansed pair with both coverage tables
    pub fn pair_stats(
        &self,
        cleansed: &dyn SortedTable<CleansedPair>,
        freebase: &dyn SortedTable<EntityCoverage>,
        wikidata: &dyn SortedTable<EntityCoverage>,
        output: &dyn SortedTable<PairStat>,
    ) -> Result<PairStatStats> {
        let mut reader = PageReader::new(cleansed, PAIR_ORDER, self.page_size);
        let mut sink = BatchSink::new(output, self.policy);
        let mut stats = PairStatStats::default();
        // input is sorted by fb_id, so one cached entry serves a whole group
        let mut current_fb: Option<EntityCoverage> = None;

        while let Some(page) = reader.next_page()? {
            let mut batch = Vec::with_capacity(page.len());
            for pair in page {
                let fb_count = match &current_fb {
                    Some(cov) if cov.entity_id == pair.fb_id => cov.lang_count,
                    _ => {
                        let cov = lookup(freebase, Side::Freebase, &pair.fb_id)?;
                        stats.lookups += 1;
                        let count = cov.lang_count;
                        current_fb = Some(cov);
                        count
                    }
                };
                let wd_count = lookup(wikidata, Side::Wikidata, &pair.wd_id)?.lang_count;
                stats.lookups += 1;

                if pair.shared_lang_count > fb_count.min(wd_count) {
                    return Err(Error::InvalidRecord {
                        table: output.name().to_string(),
                        reason: format!(
                            "pair ({}, {}) shares {} editions but coverage is {}/{}",
                            pair.fb_id, pair.wd_id, pair.shared_lang_count, fb_count, wd_count
                        ),
                    });
                }

                batch.push(PairStat {
                    fb_id: pair.fb_id,
                    wd_id: pair.wd_id,
                    shared_lang_count: pair.shared_lang_count,
                    fb_lang_count: fb_count,
                    wd_lang_count: wd_count,
                });
            }
            sink.write(&batch)?;
        }

        stats.pairs = sink.written();
        tracing::info!(pairs = stats.pairs, lookups = stats.lookups, "Pair stats computed");
        Ok(stats)
    }
}

fn lookup(
    table: &dyn SortedTable<EntityCoverage>,
    side: Side,
    entity_id: &str,
) -> Result<EntityCoverage> {
    table
        .lookup_exact(&["entity_id"], &[Field::text(entity_id)])?
        .ok_or_else(|| Error::MissingCoverage {
            side,
            entity_id: entity_id.to_string(),
        })
}
