//! sameas - Freebase / Wikidata entity linking
//!
//! Builds sameAs links between Freebase topics and Wikidata items from the
//! Wikipedia articles both sides point at.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`extract`] - Source extraction and URL hashing
//! - [`storage`] - Paginated sorted tables (SQLite, in-memory) and TSV export
//! - [`join`] - Sorted merge-join on the URL hash
//! - [`cleanse`] - Collapsing raw pairs into distinct entity pairs
//! - [`coverage`] - Per-entity language coverage and pair statistics
//! - [`matcher`] - The confidence heuristics
//! - [`pipeline`] - Stage orchestration, timing and run reports
//! - [`models`] - Core record types
//!
//! # Example
//!
//! ```no_run
//! use sameas::config::Config;
//! use sameas::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let pipeline = Pipeline::new(config)?;
//!     let report = pipeline.run(&["maxconf".to_string()], true).await?;
//!     println!("{} stages", report.stages.len());
//!     Ok(())
//! }
//! ```

pub mod cleanse;
pub mod config;
pub mod coverage;
pub mod error;
pub mod extract;
pub mod join;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, SameAsErrorTrait};
    pub use crate::join::JoinMode;
    pub use crate::matcher::{Matcher, MatcherRegistry};
    pub use crate::models::{CleansedPair, MatchedPair, PairStat, Side, SourceRow};
    pub use crate::pipeline::{Pipeline, RunReport};
    pub use crate::storage::{FailurePolicy, SortedTable, Workspace};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use pipeline::Pipeline;
