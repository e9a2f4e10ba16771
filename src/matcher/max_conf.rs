//! Max-Confidence matcher
//!
//! For every Freebase entity keep the Wikidata partners with the highest
//! shared-language count, then apply the same rule per Wikidata entity to the
//! survivors. Ties are kept on both passes.

use super::passes::max_conf_pass;
use super::{MatchContext, MatchOutcome, Matcher};
use crate::error::Result;
use crate::models::{MatchedPair, Side};

/// Scratch table of the Freebase-side pass
pub const MC_RAW_TABLE: &str = "mc_raw";
pub const MC_TABLE: &str = "mc";

#[derive(Debug, Clone, Copy, Default)]
pub struct MaxConfMatcher;

impl Matcher for MaxConfMatcher {
    fn name(&self) -> &'static str {
        "maxconf"
    }

    fn output_table(&self) -> &'static str {
        MC_TABLE
    }

    fn output_file(&self) -> &'static str {
        "max_conf.tsv"
    }

    fn run(&self, ctx: &MatchContext) -> Result<MatchOutcome> {
        let mut outcome = MatchOutcome::new(self, ctx.stats.count()?);

        let raw = ctx.workspace.fresh_table::<MatchedPair>(MC_RAW_TABLE)?;
        let rows = max_conf_pass(&*ctx.stats, Side::Freebase, &ctx.settings, &*raw)?;
        outcome.step(MC_RAW_TABLE, rows);

        let output = ctx.workspace.fresh_table::<MatchedPair>(MC_TABLE)?;
        let rows = max_conf_pass(&*raw, Side::Wikidata, &ctx.settings, &*output)?;
        outcome.step(MC_TABLE, rows);

        Ok(outcome)
    }
}
