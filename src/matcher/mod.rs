//! Heuristic matchers
//!
//! Each matcher reads the immutable `stat_pairs` relation and narrows it to a
//! set of sameAs links. Matchers only filter: every output pair is a pair of
//! the input. They write exclusively to their own tables, so any subset of
//! them can run concurrently against the same snapshot.
//!
//! | name        | pipeline                                              | output        |
//! |-------------|-------------------------------------------------------|---------------|
//! | `maxconf`   | best per fb -> best per wd                            | `mc`          |
//! | `threshold` | ratio > t -> best per fb -> best per wd               | `threshold`   |
//! | `oneonly`   | ratio > t -> sole per fb -> sole per wd               | `oneonly`     |
//! | `belief`    | 2*shared >= fb and 2*shared >= wd                      | `belief`      |

pub mod belief;
pub mod max_conf;
pub mod one_to_one;
pub mod passes;
pub mod threshold;

use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::PairStat;
use crate::storage::{FailurePolicy, SortedTable, Workspace};

pub use belief::BeliefMatcher;
pub use max_conf::MaxConfMatcher;
pub use one_to_one::OneToOneMatcher;
pub use threshold::ThresholdMatcher;

/// Tunables shared by all matchers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSettings {
    /// Ratio a pair must strictly exceed on both sides
    pub threshold: f64,
    pub page_size: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            page_size: 500_000,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

/// Everything a matcher reads: the pair statistics and where to put results
#[derive(Clone)]
pub struct MatchContext {
    pub stats: Arc<dyn SortedTable<PairStat>>,
    pub workspace: Workspace,
    pub settings: MatchSettings,
}

impl MatchContext {
    pub fn new(
        stats: Arc<dyn SortedTable<PairStat>>,
        workspace: Workspace,
        settings: MatchSettings,
    ) -> Self {
        Self {
            stats,
            workspace,
            settings,
        }
    }
}

/// Row count of one intermediate or final table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepCount {
    pub table: String,
    pub rows: u64,
}

/// What a matcher produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub matcher: String,
    pub input_pairs: u64,
    pub steps: Vec<StepCount>,
    pub output_table: String,
    pub pairs: u64,
}

impl MatchOutcome {
    fn new(matcher: &dyn Matcher, input_pairs: u64) -> Self {
        Self {
            matcher: matcher.name().to_string(),
            input_pairs,
            steps: Vec::new(),
            output_table: matcher.output_table().to_string(),
            pairs: 0,
        }
    }

    fn step(&mut self, table: &str, rows: u64) {
        self.steps.push(StepCount {
            table: table.to_string(),
            rows,
        });
        if table == self.output_table {
            self.pairs = rows;
        }
    }
}

/// A sameAs heuristic
pub trait Matcher: Send + Sync {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Table holding the final relation
    fn output_table(&self) -> &'static str;

    /// Export file name for the final relation
    fn output_file(&self) -> &'static str;

    fn run(&self, ctx: &MatchContext) -> Result<MatchOutcome>;
}

/// Matchers available to the pipeline, looked up by name
#[derive(Clone, Default)]
pub struct MatcherRegistry {
    matchers: Vec<Arc<dyn Matcher>>,
}

impl MatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in heuristics
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MaxConfMatcher));
        registry.register(Arc::new(ThresholdMatcher));
        registry.register(Arc::new(OneToOneMatcher));
        registry.register(Arc::new(BeliefMatcher));
        registry
    }

    /// Add a matcher, replacing one with the same name
    pub fn register(&mut self, matcher: Arc<dyn Matcher>) {
        self.matchers.retain(|m| m.name() != matcher.name());
        self.matchers.push(matcher);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Matcher>> {
        self.matchers
            .iter()
            .find(|m| m.name() == name)
            .cloned()
            .ok_or_else(|| Error::UnknownMatcher {
                name: name.to_string(),
                valid: self.names().iter().map(|n| n.to_string()).collect(),
            })
    }

    /// Resolve `names` in registry order, dropping duplicates
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn Matcher>>> {
        for name in names {
            self.get(name.as_ref())?;
        }
        Ok(self
            .matchers
            .iter()
            .filter(|m| names.iter().any(|n| n.as_ref() == m.name()))
            .cloned()
            .collect())
    }
}

impl std::fmt::Debug for MatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatcherRegistry")
            .field("matchers", &self.names())
            .finish()
    }
}
