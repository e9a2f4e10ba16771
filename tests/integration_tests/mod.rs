//! Integration tests module
//!
//! End-to-end tests for the sameas pipeline:
//! - Freebase dump + Wikidata site links -> TSV exports
//! - Re-running single stages against an existing workspace
//! - Error handling and stage attribution

pub mod error_scenarios;
pub mod pipeline_test;
