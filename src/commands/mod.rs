pub mod pipeline;
pub mod summary;

// Re-export command functions for convenience
pub use pipeline::{ingest, join, match_stats, run, stats, RunOptions};
pub use summary::summary;
