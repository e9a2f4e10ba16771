//! Stage timing and the run report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::cleanse::CleanseStats;
use crate::coverage::{CoverageStats, PairStatStats};
use crate::error::Result;
use crate::extract::ExtractStats;
use crate::join::JoinStats;
use crate::matcher::MatchOutcome;
use crate::storage::ExportSummary;

/// Wall-clock record of one finished stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Rows written by the stage
    pub rows: u64,
}

/// A running stage
///
/// Created when the stage starts and consumed when it finishes. It is `Send`
/// so matcher tasks can time themselves on their own threads.
#[derive(Debug)]
pub struct StageTimer {
    name: String,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl StageTimer {
    pub fn begin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn finish(self, rows: u64) -> StageRecord {
        StageRecord {
            name: self.name,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_ms: u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX),
            rows,
        }
    }
}

/// Timing of one stage relative to the whole run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageShare {
    pub name: String,
    pub elapsed_ms: u64,
    pub percentage: f64,
}

/// Everything a run did, written as `report.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub join_mode: String,
    pub strategies: Vec<String>,
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freebase_extract: Option<ExtractStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wikidata_extract: Option<ExtractStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanse: Option<CleanseStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freebase_coverage: Option<CoverageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wikidata_coverage: Option<CoverageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_stats: Option<PairStatStats>,
    pub matchers: Vec<MatchOutcome>,
    pub exports: Vec<ExportSummary>,
    #[serde(skip)]
    start: Option<Instant>,
}

impl RunReport {
    pub fn new(join_mode: &str, strategies: &[String]) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            join_mode: join_mode.to_string(),
            strategies: strategies.to_vec(),
            stages: Vec::new(),
            freebase_extract: None,
            wikidata_extract: None,
            join: None,
            cleanse: None,
            freebase_coverage: None,
            wikidata_coverage: None,
            pair_stats: None,
            matchers: Vec::new(),
            exports: Vec::new(),
            start: Some(Instant::now()),
        }
    }

    pub fn record(&mut self, stage: StageRecord) {
        self.stages.push(stage);
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Milliseconds since the report was created
    pub fn total_ms(&self) -> u64 {
        self.start
            .map(|s| u64::try_from(s.elapsed().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Per-stage share of the summed stage time
    pub fn breakdown(&self) -> Vec<StageShare> {
        let total: u64 = self.stages.iter().map(|s| s.elapsed_ms).sum();
        let mut shares: Vec<StageShare> = self
            .stages
            .iter()
            .map(|s| StageShare {
                name: s.name.clone(),
                elapsed_ms: s.elapsed_ms,
                percentage: if total > 0 {
                    (s.elapsed_ms as f64 / total as f64) * 100.0
                } else {
                    0.0
                },
            })
            .collect();
        shares.sort_by(|a, b| b.elapsed_ms.cmp(&a.elapsed_ms));
        shares
    }

    /// Write the report as pretty JSON to `path`, replacing it atomically
    pub fn write_json(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, path)?;
        Ok(path.to_path_buf())
    }
}
