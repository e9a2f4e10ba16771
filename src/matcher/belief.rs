//! Belief-based matcher
//!
//! A pair is kept when the editions it shares are not outnumbered by the
//! editions that disagree, on either side:
//! `shared >= fb_total - shared` and `shared >= wd_total - shared`.

use super::{MatchContext, MatchOutcome, Matcher};
use crate::error::Result;
use crate::models::{MatchedPair, PairStat, ScoredPair};
use crate::storage::{BatchSink, PageReader};

pub const BELIEF_TABLE: &str = "belief";

/// Majority vote on both sides (integer form of `shared >= total / 2`)
pub fn believed(stat: &PairStat) -> bool {
    let shared = u64::from(stat.shared_lang_count) * 2;
    shared >= u64::from(stat.fb_lang_count) && shared >= u64::from(stat.wd_lang_count)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BeliefMatcher;

impl Matcher for BeliefMatcher {
    fn name(&self) -> &'static str {
        "belief"
    }

    fn output_table(&self) -> &'static str {
        BELIEF_TABLE
    }

    fn output_file(&self) -> &'static str {
        "belief.tsv"
    }

    fn run(&self, ctx: &MatchContext) -> Result<MatchOutcome> {
        let mut outcome = MatchOutcome::new(self, ctx.stats.count()?);
        let output = ctx.workspace.fresh_table::<MatchedPair>(BELIEF_TABLE)?;

        let mut reader = PageReader::new(&*ctx.stats, &["fb_id", "wd_id"], ctx.settings.page_size);
        let mut sink = BatchSink::new(&*output, ctx.settings.failure_policy);
        while let Some(page) = reader.next_page()? {
            let kept: Vec<MatchedPair> = page
                .iter()
                .filter(|stat| believed(stat))
                .map(ScoredPair::to_matched)
                .collect();
            sink.write(&kept)?;
        }
        outcome.step(BELIEF_TABLE, sink.written());

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::test_support::{context, output, pairs, stat};

    #[test]
    fn test_believed_is_non_strict() {
        // exactly half on the Freebase side is enough
        assert!(believed(&stat("F1", "W1", 1, 2, 1)));
        assert!(believed(&stat("F1", "W2", 1, 2, 2)));
        assert!(!believed(&stat("F1", "W3", 1, 3, 1)));
        assert!(!believed(&stat("F1", "W4", 2, 4, 5)));
    }

    #[test]
    fn test_example_scenario_keeps_both() {
        let stats = [stat("F1", "W1", 1, 2, 1), stat("F1", "W2", 1, 2, 2)];
        let ctx = context(&stats, 1, 0.5);
        let outcome = BeliefMatcher.run(&ctx).unwrap();
        assert_eq!(output(&ctx, BELIEF_TABLE), pairs(&[("F1", "W1"), ("F1", "W2")]));
        assert_eq!(outcome.pairs, 2);
    }

    #[test]
    fn test_ignores_threshold_setting() {
        let stats = [stat("F1", "W1", 2, 4, 3)];
        let ctx = context(&stats, 10, 0.9);
        BeliefMatcher.run(&ctx).unwrap();
        assert_eq!(output(&ctx, BELIEF_TABLE), pairs(&[("F1", "W1")]));
    }
}
