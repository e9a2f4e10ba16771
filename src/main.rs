mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sameas::config::Config;
use sameas::join::JoinMode;
use sameas::storage::FailurePolicy;

use commands::RunOptions;

#[derive(Parser)]
#[command(
    name = "sameas",
    version,
    about = "Build Freebase / Wikidata sameAs links from shared Wikipedia articles",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Rows per page for scans and batch writes
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Ratio threshold for the threshold and oneonly matchers
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Merge-join mode (fan_out, advance_one)
    #[arg(long, global = true)]
    join_mode: Option<JoinMode>,

    /// Batch failure policy (abort, skip)
    #[arg(long, global = true)]
    failure_policy: Option<FailurePolicy>,

    /// Workspace directory for stage tables
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Output directory for TSV exports and the run report
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the Freebase dump and Wikidata site links
    Ingest {
        /// Freebase RDF dump
        #[arg(long)]
        freebase: Option<PathBuf>,

        /// Wikidata SQLite database with wb_items_per_site
        #[arg(long)]
        wikidata: Option<PathBuf>,
    },

    /// Run the full pipeline
    Run {
        /// Matcher to run (repeatable); defaults to the configured strategies
        #[arg(short, long = "strategy")]
        strategies: Vec<String>,

        /// Reuse the already extracted source tables
        #[arg(long, default_value = "false")]
        skip_ingest: bool,

        /// Run matchers one after another
        #[arg(long, default_value = "false")]
        sequential: bool,

        /// Freebase RDF dump
        #[arg(long)]
        freebase: Option<PathBuf>,

        /// Wikidata SQLite database with wb_items_per_site
        #[arg(long)]
        wikidata: Option<PathBuf>,
    },

    /// Merge-join the source tables and cleanse the result
    Join,

    /// Build coverage tables and pair statistics
    Stats,

    /// Re-run matchers from existing pair statistics
    Match {
        /// Matcher to run (repeatable)
        #[arg(short, long = "strategy")]
        strategies: Vec<String>,
    },

    /// Show row and entity counts per stage table
    Summary {
        /// Print as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

impl Cli {
    /// Layer command-line overrides on top of file and environment settings
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref()).context("Failed to load configuration")?;

        if let Some(page_size) = self.page_size {
            config.pipeline.page_size = page_size;
        }
        if let Some(threshold) = self.threshold {
            config.pipeline.threshold = threshold;
        }
        if let Some(mode) = self.join_mode {
            config.pipeline.join_mode = mode;
        }
        if let Some(policy) = self.failure_policy {
            config.pipeline.failure_policy = policy;
        }
        if let Some(dir) = &self.workspace {
            config.paths.workspace_dir = dir.clone();
        }
        if let Some(dir) = &self.output {
            config.paths.output_dir = dir.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }

        match &self.command {
            Commands::Ingest { freebase, wikidata } | Commands::Run { freebase, wikidata, .. } => {
                if let Some(path) = freebase {
                    config.sources.freebase_dump = Some(path.clone());
                }
                if let Some(path) = wikidata {
                    config.sources.wikidata_db = Some(path.clone());
                }
            }
            _ => {}
        }
        if let Commands::Run { sequential: true, .. } = self.command {
            config.pipeline.parallel_matchers = false;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // Initialize tracing/logging
    setup_tracing(&config.logging.level, &config.logging.format, cli.verbose)?;

    tracing::info!(
        workspace = %config.paths.workspace_dir.display(),
        output = %config.paths.output_dir.display(),
        page_size = config.pipeline.page_size,
        "sameas starting"
    );

    let command = async move {
        match cli.command {
            Commands::Ingest { .. } => {
                tracing::info!("Starting ingest command");
                commands::ingest(config).await
            }

            Commands::Run {
                strategies,
                skip_ingest,
                ..
            } => {
                tracing::info!(
                    strategies = ?strategies,
                    skip_ingest = %skip_ingest,
                    "Starting run command"
                );
                commands::run(
                    config,
                    RunOptions {
                        strategies,
                        skip_ingest,
                    },
                )
                .await
            }

            Commands::Join => {
                tracing::info!("Starting join command");
                commands::join(config).await
            }

            Commands::Stats => {
                tracing::info!("Starting stats command");
                commands::stats(config).await
            }

            Commands::Match { strategies } => {
                tracing::info!(strategies = ?strategies, "Starting match command");
                commands::match_stats(config, strategies).await
            }

            Commands::Summary { json } => commands::summary(config, json).await,
        }
    };

    tokio::select! {
        result = command => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping after the current stage");
            anyhow::bail!("interrupted");
        }
    }

    tracing::info!("sameas completed successfully");
    Ok(())
}

fn setup_tracing(level: &str, format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("sameas=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("sameas={level},warn"))
            .with_context(|| format!("Invalid log level '{level}'"))?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
