use anyhow::{Context, Result};

use sameas::config::Config;
use sameas::pipeline::Pipeline;

fn count(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub async fn summary(config: Config, json: bool) -> Result<()> {
    let pipeline = Pipeline::new(config).context("Failed to open pipeline workspace")?;
    let tables = pipeline.summary().await.context("Failed to summarize tables")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    println!("Workspace Summary");
    println!("=================");
    println!(
        "  {:<18} {:>12} {:>12} {:>12}",
        "table", "rows", "freebase", "wikidata"
    );
    for table in &tables {
        println!(
            "  {:<18} {:>12} {:>12} {:>12}",
            table.table,
            table.rows,
            count(table.freebase_entities),
            count(table.wikidata_entities)
        );
    }
    Ok(())
}
