//! Ratio-Threshold matcher
//!
//! Keeps a pair only when the shared editions make up strictly more than
//! `threshold` of each side's coverage, then runs max-confidence from both
//! sides over the survivors.

use std::sync::Arc;

use super::passes::{filter_pass, max_conf_pass};
use super::{MatchContext, MatchOutcome, Matcher};
use crate::error::Result;
use crate::models::{MatchedPair, PairStat, Side};
use crate::storage::SortedTable;

pub const THRESHOLD_RAW_TABLE: &str = "threshold_raw";
pub const THRESHOLD_RAW1_TABLE: &str = "threshold_raw1";
pub const THRESHOLD_TABLE: &str = "threshold";

/// Both coverage ratios strictly above the threshold
pub fn above_threshold(stat: &PairStat, threshold: f64) -> bool {
    stat.fb_ratio() > threshold && stat.wd_ratio() > threshold
}

/// Write the pairs passing [`above_threshold`] to `table` (shared with one-to-one)
pub(crate) fn threshold_filter(
    ctx: &MatchContext,
    table: &str,
) -> Result<(Arc<dyn SortedTable<PairStat>>, u64)> {
    let filtered = ctx.workspace.fresh_table::<PairStat>(table)?;
    let threshold = ctx.settings.threshold;
    let rows = filter_pass(
        &*ctx.stats,
        |stat: &PairStat| above_threshold(stat, threshold),
        &ctx.settings,
        &*filtered,
    )?;
    Ok((filtered, rows))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdMatcher;

impl Matcher for ThresholdMatcher {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn output_table(&self) -> &'static str {
        THRESHOLD_TABLE
    }

    fn output_file(&self) -> &'static str {
        "threshold.tsv"
    }

    fn run(&self, ctx: &MatchContext) -> Result<MatchOutcome> {
        let mut outcome = MatchOutcome::new(self, ctx.stats.count()?);

        let (filtered, rows) = threshold_filter(ctx, THRESHOLD_RAW_TABLE)?;
        outcome.step(THRESHOLD_RAW_TABLE, rows);

        let by_fb = ctx.workspace.fresh_table::<MatchedPair>(THRESHOLD_RAW1_TABLE)?;
        let rows = max_conf_pass(&*filtered, Side::Freebase, &ctx.settings, &*by_fb)?;
        outcome.step(THRESHOLD_RAW1_TABLE, rows);

        let output = ctx.workspace.fresh_table::<MatchedPair>(THRESHOLD_TABLE)?;
        let rows = max_conf_pass(&*by_fb, Side::Wikidata, &ctx.settings, &*output)?;
        outcome.step(THRESHOLD_TABLE, rows);

        Ok(outcome)
    }
}
