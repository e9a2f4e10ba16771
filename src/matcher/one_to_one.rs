//! One-to-One matcher
//!
//! After the ratio filter, a pair survives only if it is the sole candidate
//! of its Freebase entity and, among those, the sole candidate of its
//! Wikidata entity.

use super::passes::unique_pass;
use super::threshold::threshold_filter;
use super::{MatchContext, MatchOutcome, Matcher};
use crate::error::Result;
use crate::models::{MatchedPair, Side};

pub const ONEONLY_FILTERED_TABLE: &str = "oneonly_filtered";
pub const ONEONLY_RAW_TABLE: &str = "oneonly_raw";
pub const ONEONLY_TABLE: &str = "oneonly";

#[derive(Debug, Clone, Copy, Default)]
pub struct OneToOneMatcher;

impl Matcher for OneToOneMatcher {
    fn name(&self) -> &'static str {
        "oneonly"
    }

    fn output_table(&self) -> &'static str {
        ONEONLY_TABLE
    }

    fn output_file(&self) -> &'static str {
        "one2one.tsv"
    }

    fn run(&self, ctx: &MatchContext) -> Result<MatchOutcome> {
        let mut outcome = MatchOutcome::new(self, ctx.stats.count()?);

        let (filtered, rows) = threshold_filter(ctx, ONEONLY_FILTERED_TABLE)?;
        outcome.step(ONEONLY_FILTERED_TABLE, rows);

        let by_fb = ctx.workspace.fresh_table::<MatchedPair>(ONEONLY_RAW_TABLE)?;
        let rows = unique_pass(&*filtered, Side::Freebase, &ctx.settings, &*by_fb)?;
        outcome.step(ONEONLY_RAW_TABLE, rows);

        let output = ctx.workspace.fresh_table::<MatchedPair>(ONEONLY_TABLE)?;
        let rows = unique_pass(&*by_fb, Side::Wikidata, &ctx.settings, &*output)?;
        outcome.step(ONEONLY_TABLE, rows);

        Ok(outcome)
    }
}
