use anyhow::{Context, Result};

use sameas::config::Config;
use sameas::pipeline::{Pipeline, RunReport, REPORT_FILE};

/// Options of the `run` subcommand
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Matchers to run; empty means the configured strategies
    pub strategies: Vec<String>,
    pub skip_ingest: bool,
}

fn open(config: Config) -> Result<Pipeline> {
    Pipeline::new(config).context("Failed to open pipeline workspace")
}

fn print_stages(report: &RunReport) {
    println!("\nStages");
    println!("------");
    for stage in &report.stages {
        println!(
            "  {:<20} {:>12} rows {:>10} ms",
            stage.name, stage.rows, stage.elapsed_ms
        );
    }
}

fn print_matchers(report: &RunReport) {
    if report.matchers.is_empty() {
        return;
    }
    println!("\nMatchers");
    println!("--------");
    for outcome in &report.matchers {
        let steps: Vec<String> = outcome
            .steps
            .iter()
            .map(|s| format!("{}={}", s.table, s.rows))
            .collect();
        println!(
            "  {:<10} {:>12} pairs  ({})",
            outcome.matcher,
            outcome.pairs,
            steps.join(", ")
        );
    }
}

pub async fn run(config: Config, options: RunOptions) -> Result<()> {
    let output_dir = config.paths.output_dir.clone();
    let pipeline = open(config)?;

    println!("Running sameAs pipeline");
    println!("=======================");

    let report = pipeline
        .run(&options.strategies, !options.skip_ingest)
        .await
        .context("Pipeline run failed")?;

    print_stages(&report);
    print_matchers(&report);

    println!("\nExports");
    println!("-------");
    for export in &report.exports {
        println!("  {} ({} pairs)", export.path.display(), export.rows);
    }
    println!("\nReport: {}", output_dir.join(REPORT_FILE).display());
    println!("Total time: {} ms", report.total_ms());
    Ok(())
}

pub async fn ingest(config: Config) -> Result<()> {
    let pipeline = open(config)?;
    let mut report = pipeline.new_report(&[]);

    println!("Extracting sources");
    println!("==================");
    pipeline.ingest(&mut report).await.context("Ingest failed")?;

    if let Some(stats) = report.freebase_extract {
        println!(
            "Freebase: {} lines, {} links, {} skipped",
            stats.scanned, stats.extracted, stats.skipped
        );
    }
    if let Some(stats) = report.wikidata_extract {
        println!(
            "Wikidata: {} site links, {} Wikipedia links",
            stats.scanned, stats.extracted
        );
    }
    print_stages(&report);
    Ok(())
}

pub async fn join(config: Config) -> Result<()> {
    let pipeline = open(config)?;
    let mut report = pipeline.new_report(&[]);

    println!("Joining sources ({})", report.join_mode);
    pipeline.join(&mut report).await.context("Join failed")?;

    if let (Some(join), Some(cleanse)) = (report.join, report.cleanse) {
        println!("Raw pairs: {}", join.pairs);
        println!(
            "Cleansed pairs: {} ({} Freebase entities)",
            cleanse.pairs, cleanse.freebase_entities
        );
    }
    print_stages(&report);
    Ok(())
}

pub async fn stats(config: Config) -> Result<()> {
    let pipeline = open(config)?;
    let mut report = pipeline.new_report(&[]);

    println!("Computing coverage statistics");
    pipeline.stats(&mut report).await.context("Stats failed")?;

    if let Some(stats) = report.freebase_coverage {
        println!("Freebase entities: {}", stats.entities);
    }
    if let Some(stats) = report.wikidata_coverage {
        println!("Wikidata entities: {}", stats.entities);
    }
    if let Some(stats) = report.pair_stats {
        println!("Pair stats: {}", stats.pairs);
    }
    print_stages(&report);
    Ok(())
}

/// Re-run matchers and exports over the existing `stat_pairs`
pub async fn match_stats(config: Config, strategies: Vec<String>) -> Result<()> {
    let strategies = if strategies.is_empty() {
        config.pipeline.strategies.clone()
    } else {
        strategies
    };
    let pipeline = open(config)?;
    let mut report = pipeline.new_report(&strategies);

    println!("Running matchers: {}", strategies.join(", "));
    pipeline
        .run_matchers(&strategies, &mut report)
        .await
        .context("Matching failed")?;
    pipeline
        .export(&strategies, &mut report)
        .await
        .context("Export failed")?;

    print_matchers(&report);
    for export in &report.exports {
        println!("  {} ({} pairs)", export.path.display(), export.rows);
    }
    Ok(())
}
