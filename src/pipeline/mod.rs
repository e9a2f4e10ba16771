//! Pipeline driver
//!
//! Runs the stages in a fixed order:
//!
//! ```text
//! ingest (optional) -> join -> cleanse -> coverage -> pair stats -> matchers -> export
//! ```
//!
//! Every stage drains its input completely before the next one starts. The
//! stages are synchronous table scans, so each runs on a blocking task; the
//! selected matchers share the immutable `stat_pairs` table and may run side
//! by side. Each stage is timed into the [`RunReport`], and any error is tagged
//! with the stage name so that stage can be re-run on its own.

pub mod profiler;

use serde::Serialize;
use std::sync::Arc;

use crate::cleanse::Cleanser;
use crate::config::Config;
use crate::coverage::CoverageBuilder;
use crate::error::{Error, Result};
use crate::extract::{FreebaseExtractor, SqliteSiteLinks, WikidataExtractor};
use crate::join::RawJoiner;
use crate::matcher::{MatchContext, MatchOutcome, Matcher, MatcherRegistry};
use crate::models::{
    CleansedPair, EntityCoverage, MatchedPair, PairStat, RawPair, Side, SourceRow,
};
use crate::storage::{count_distinct, Record, SortedTable, TsvExporter, Workspace};

pub use profiler::{RunReport, StageRecord, StageShare, StageTimer};

pub const FREEBASE_TABLE: &str = "freebase";
pub const WIKIDATA_TABLE: &str = "wikidata";
pub const RAW_TABLE: &str = "raw";
pub const ORIGIN_TABLE: &str = "origin";
pub const STAT_FREEBASE_TABLE: &str = "stat_freebase";
pub const STAT_WIKIDATA_TABLE: &str = "stat_wikidata";
pub const STAT_PAIRS_TABLE: &str = "stat_pairs";

/// Export file of the cleansed relation
pub const ORIGIN_FILE: &str = "origin.tsv";
pub const REPORT_FILE: &str = "report.json";

fn matcher_stage(name: &str) -> String {
    format!("match:{name}")
}

/// Row and entity counts of one stage table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freebase_entities: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wikidata_entities: Option<u64>,
}

/// Drives the stages over one workspace
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
    workspace: Workspace,
    registry: MatcherRegistry,
}

impl Pipeline {
    /// Validate `config` and open its workspace
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let workspace = config.workspace()?;
        Ok(Self::with_workspace(config, workspace))
    }

    pub fn with_workspace(config: Config, workspace: Workspace) -> Self {
        Self {
            config,
            workspace,
            registry: MatcherRegistry::builtin(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: MatcherRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn registry(&self) -> &MatcherRegistry {
        &self.registry
    }

    /// An empty report for a run of `strategies`
    pub fn new_report(&self, strategies: &[String]) -> RunReport {
        RunReport::new(self.config.pipeline.join_mode.as_str(), strategies)
    }

    /// Run one stage body on a blocking task and record its timing
    async fn blocking<T, F>(&self, stage: &str, report: &mut RunReport, body: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Workspace, &Config) -> Result<(T, u64)> + Send + 'static,
    {
        tracing::info!(stage, "Stage started");
        let workspace = self.workspace.clone();
        let config = self.config.clone();
        let timer = StageTimer::begin(stage);

        let (value, rows) = tokio::task::spawn_blocking(move || body(&workspace, &config))
            .await
            .map_err(|e| Error::from(e).in_stage(stage))?
            .map_err(|e| e.in_stage(stage))?;

        let record = timer.finish(rows);
        tracing::info!(stage, rows, elapsed_ms = record.elapsed_ms, "Stage finished");
        report.record(record);
        Ok(value)
    }

    /// Extract both sources into the `freebase` and `wikidata` tables
    pub async fn ingest(&self, report: &mut RunReport) -> Result<()> {
        self.config
            .validate_sources()
            .map_err(|e| e.in_stage("ingest"))?;

        let freebase = self
            .blocking("ingest_freebase", report, |workspace, config| {
                let path = config
                    .sources
                    .freebase_dump
                    .clone()
                    .ok_or_else(|| Error::config("sources.freebase_dump is required for ingest"))?;
                let table = workspace.fresh_table::<SourceRow>(FREEBASE_TABLE)?;
                let stats = FreebaseExtractor::new(
                    config.pipeline.page_size,
                    config.pipeline.failure_policy,
                )
                .extract_file(&path, table.as_ref())?;
                Ok((stats, stats.extracted))
            })
            .await?;
        report.freebase_extract = Some(freebase);

        let wikidata = self
            .blocking("ingest_wikidata", report, |workspace, config| {
                let path = config
                    .sources
                    .wikidata_db
                    .clone()
                    .ok_or_else(|| Error::config("sources.wikidata_db is required for ingest"))?;
                let mut links = SqliteSiteLinks::open(&path)?;
                let table = workspace.fresh_table::<SourceRow>(WIKIDATA_TABLE)?;
                let stats = WikidataExtractor::new(
                    config.pipeline.page_size,
                    config.pipeline.failure_policy,
                )
                .extract(&mut links, table.as_ref())?;
                Ok((stats, stats.extracted))
            })
            .await?;
        report.wikidata_extract = Some(wikidata);

        Ok(())
    }

    /// Merge-join the source tables and cleanse the result into `origin`
    pub async fn join(&self, report: &mut RunReport) -> Result<()> {
        let join = self
            .blocking("join", report, |workspace, config| {
                let freebase = workspace.table::<SourceRow>(FREEBASE_TABLE)?;
                let wikidata = workspace.table::<SourceRow>(WIKIDATA_TABLE)?;
                let raw = workspace.fresh_table::<RawPair>(RAW_TABLE)?;
                let stats = RawJoiner::new(
                    config.pipeline.join_mode,
                    config.pipeline.page_size,
                    config.pipeline.failure_policy,
                )
                .join(freebase.as_ref(), wikidata.as_ref(), raw.as_ref())?;
                Ok((stats, stats.pairs))
            })
            .await?;
        report.join = Some(join);

        let cleanse = self
            .blocking("cleanse", report, |workspace, config| {
                let raw = workspace.table::<RawPair>(RAW_TABLE)?;
                let origin = workspace.fresh_table::<CleansedPair>(ORIGIN_TABLE)?;
                let stats = Cleanser::new(config.pipeline.page_size, config.pipeline.failure_policy)
                    .cleanse(raw.as_ref(), origin.as_ref())?;
                Ok((stats, stats.pairs))
            })
            .await?;
        report.cleanse = Some(cleanse);

        Ok(())
    }

    /// Build both coverage tables and the `stat_pairs` relation
    pub async fn stats(&self, report: &mut RunReport) -> Result<()> {
        for (side, stage, source, target) in [
            (Side::Freebase, "coverage_freebase", FREEBASE_TABLE, STAT_FREEBASE_TABLE),
            (Side::Wikidata, "coverage_wikidata", WIKIDATA_TABLE, STAT_WIKIDATA_TABLE),
        ] {
            let coverage = self
                .blocking(stage, report, move |workspace, config| {
                    let source = workspace.table::<SourceRow>(source)?;
                    let output = workspace.fresh_table::<EntityCoverage>(target)?;
                    let stats = CoverageBuilder::new(
                        config.pipeline.page_size,
                        config.pipeline.failure_policy,
                    )
                    .entity_coverage(side, source.as_ref(), output.as_ref())?;
                    Ok((stats, stats.entities))
                })
                .await?;
            match side {
                Side::Freebase => report.freebase_coverage = Some(coverage),
                Side::Wikidata => report.wikidata_coverage = Some(coverage),
            }
        }

        let pair_stats = self
            .blocking("pair_stats", report, |workspace, config| {
                let cleansed = workspace.table::<CleansedPair>(ORIGIN_TABLE)?;
                let freebase = workspace.table::<EntityCoverage>(STAT_FREEBASE_TABLE)?;
                let wikidata = workspace.table::<EntityCoverage>(STAT_WIKIDATA_TABLE)?;
                let output = workspace.fresh_table::<PairStat>(STAT_PAIRS_TABLE)?;
                let stats = CoverageBuilder::new(
                    config.pipeline.page_size,
                    config.pipeline.failure_policy,
                )
                .pair_stats(
                    cleansed.as_ref(),
                    freebase.as_ref(),
                    wikidata.as_ref(),
                    output.as_ref(),
                )?;
                Ok((stats, stats.pairs))
            })
            .await?;
        report.pair_stats = Some(pair_stats);

        Ok(())
    }

    /// Run the selected matchers against the current `stat_pairs`
    pub async fn run_matchers(&self, strategies: &[String], report: &mut RunReport) -> Result<()> {
        let matchers = self.registry.select(strategies)?;
        let stats = self.workspace.table::<PairStat>(STAT_PAIRS_TABLE)?;
        if stats.count()? == 0 {
            tracing::warn!(table = STAT_PAIRS_TABLE, "Matching over an empty relation");
        }
        let ctx = MatchContext::new(stats, self.workspace.clone(), self.config.match_settings());

        let results = if self.config.pipeline.parallel_matchers {
            tracing::info!(matchers = matchers.len(), "Running matchers in parallel");
            let tasks = matchers.iter().map(|matcher| {
                let matcher = Arc::clone(matcher);
                let ctx = ctx.clone();
                tokio::task::spawn_blocking(move || run_matcher(matcher.as_ref(), &ctx))
            });
            futures::future::join_all(tasks).await
        } else {
            let mut results = Vec::with_capacity(matchers.len());
            for matcher in &matchers {
                let matcher = Arc::clone(matcher);
                let ctx = ctx.clone();
                results.push(
                    tokio::task::spawn_blocking(move || run_matcher(matcher.as_ref(), &ctx)).await,
                );
            }
            results
        };

        // registry order, first failure wins
        for (matcher, result) in matchers.iter().zip(results) {
            let (outcome, record) =
                result.map_err(|e| Error::from(e).in_stage(matcher_stage(matcher.name())))??;
            report.record(record);
            report.matchers.push(outcome);
        }
        Ok(())
    }

    /// Export `origin` and each selected matcher's output as TSV
    pub async fn export(&self, strategies: &[String], report: &mut RunReport) -> Result<()> {
        let matchers = self.registry.select(strategies)?;
        let exports = self
            .blocking("export", report, move |workspace, config| {
                let exporter =
                    TsvExporter::new(&config.paths.output_dir, config.pipeline.page_size);
                let mut summaries = Vec::with_capacity(matchers.len() + 1);

                let origin = workspace.table::<CleansedPair>(ORIGIN_TABLE)?;
                summaries.push(exporter.export(origin.as_ref(), ORIGIN_FILE)?);
                for matcher in &matchers {
                    let table = workspace.table::<MatchedPair>(matcher.output_table())?;
                    summaries.push(exporter.export(table.as_ref(), matcher.output_file())?);
                }

                let rows: u64 = summaries.iter().map(|s| s.rows).sum();
                Ok((summaries, rows))
            })
            .await?;
        report.exports = exports;
        Ok(())
    }

    /// Full run; an empty `strategies` falls back to the configured ones
    pub async fn run(&self, strategies: &[String], ingest: bool) -> Result<RunReport> {
        let strategies = if strategies.is_empty() {
            self.config.pipeline.strategies.clone()
        } else {
            strategies.to_vec()
        };

        // fail before any stage has touched the workspace
        self.registry.select(&strategies)?;
        if ingest {
            self.config.validate_sources()?;
        }

        let mut report = self.new_report(&strategies);
        tracing::info!(
            run_id = %report.run_id,
            strategies = ?strategies,
            join_mode = %report.join_mode,
            ingest,
            "Pipeline run started"
        );

        if ingest {
            self.ingest(&mut report).await?;
        }
        self.join(&mut report).await?;
        self.stats(&mut report).await?;
        self.run_matchers(&strategies, &mut report).await?;
        self.export(&strategies, &mut report).await?;

        report.finish();
        let path = report.write_json(&self.config.paths.output_dir.join(REPORT_FILE))?;
        tracing::info!(
            run_id = %report.run_id,
            total_ms = report.total_ms(),
            report = %path.display(),
            "Pipeline run finished"
        );
        Ok(report)
    }

    /// Row and distinct-entity counts for every stage table
    pub async fn summary(&self) -> Result<Vec<TableSummary>> {
        let workspace = self.workspace.clone();
        let page_size = self.config.pipeline.page_size;
        let outputs: Vec<&'static str> =
            self.registry.select(&self.registry.names())?.iter().map(|m| m.output_table()).collect();

        tokio::task::spawn_blocking(move || {
            let mut summaries = vec![
                source_summary(&workspace, FREEBASE_TABLE, Side::Freebase, page_size)?,
                source_summary(&workspace, WIKIDATA_TABLE, Side::Wikidata, page_size)?,
                pair_summary::<RawPair>(&workspace, RAW_TABLE, page_size)?,
                pair_summary::<CleansedPair>(&workspace, ORIGIN_TABLE, page_size)?,
                coverage_summary(&workspace, STAT_FREEBASE_TABLE, Side::Freebase)?,
                coverage_summary(&workspace, STAT_WIKIDATA_TABLE, Side::Wikidata)?,
                pair_summary::<PairStat>(&workspace, STAT_PAIRS_TABLE, page_size)?,
            ];
            for table in outputs {
                summaries.push(pair_summary::<MatchedPair>(&workspace, table, page_size)?);
            }
            Ok(summaries)
        })
        .await
        .map_err(|e| Error::from(e).in_stage("summary"))?
    }
}

fn run_matcher(matcher: &dyn Matcher, ctx: &MatchContext) -> Result<(MatchOutcome, StageRecord)> {
    let stage = matcher_stage(matcher.name());
    tracing::info!(stage = %stage, "Stage started");
    let timer = StageTimer::begin(stage.clone());

    let outcome = matcher.run(ctx).map_err(|e| e.in_stage(&stage))?;

    let record = timer.finish(outcome.pairs);
    tracing::info!(
        stage = %stage,
        rows = outcome.pairs,
        elapsed_ms = record.elapsed_ms,
        "Stage finished"
    );
    Ok((outcome, record))
}

fn entity_counts(side: Side, count: u64) -> (Option<u64>, Option<u64>) {
    match side {
        Side::Freebase => (Some(count), None),
        Side::Wikidata => (None, Some(count)),
    }
}

fn source_summary(
    workspace: &Workspace,
    name: &str,
    side: Side,
    page_size: usize,
) -> Result<TableSummary> {
    let table = workspace.table::<SourceRow>(name)?;
    let entities = count_distinct(table.as_ref(), "entity_id", page_size)?;
    let (freebase_entities, wikidata_entities) = entity_counts(side, entities);
    Ok(TableSummary {
        table: name.to_string(),
        rows: table.count()?,
        freebase_entities,
        wikidata_entities,
    })
}

fn coverage_summary(workspace: &Workspace, name: &str, side: Side) -> Result<TableSummary> {
    let table = workspace.table::<EntityCoverage>(name)?;
    let rows = table.count()?;
    let (freebase_entities, wikidata_entities) = entity_counts(side, rows);
    Ok(TableSummary {
        table: name.to_string(),
        rows,
        freebase_entities,
        wikidata_entities,
    })
}

fn pair_summary<R: Record>(workspace: &Workspace, name: &str, page_size: usize) -> Result<TableSummary> {
    let table: Arc<dyn SortedTable<R>> = workspace.table::<R>(name)?;
    Ok(TableSummary {
        table: name.to_string(),
        rows: table.count()?,
        freebase_entities: Some(count_distinct(table.as_ref(), "fb_id", page_size)?),
        wikidata_entities: Some(count_distinct(table.as_ref(), "wd_id", page_size)?),
    })
}
