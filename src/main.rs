use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error};

use disaster_etl::config::{Config, DedupPolicy, IfExists, MergeStrategy, SchemaPolicy};
use disaster_etl::constants::USAGE;
use disaster_etl::logging;
use disaster_etl::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "disaster_etl")]
#[command(about = "Merge disaster messages with their categories into a wide SQLite table")]
#[command(version)]
struct Cli {
    /// <records_path> <categories_path> <database_path>
    #[arg(value_name = "PATHS")]
    paths: Vec<PathBuf>,

    /// TOML configuration file (defaults to ./etl.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Destination table name
    #[arg(long)]
    table_name: Option<String>,

    /// What to do when the destination table exists: fail, replace
    #[arg(long)]
    if_exists: Option<IfExists>,

    /// How records and categories are paired: positional, by-id
    #[arg(long = "merge")]
    merge_strategy: Option<MergeStrategy>,

    /// How category columns are derived: first-row, strict, union
    #[arg(long = "schema")]
    schema_policy: Option<SchemaPolicy>,

    /// Which rows count as duplicates: full-row, by-id
    #[arg(long = "dedup")]
    dedup_policy: Option<DedupPolicy>,

    /// Field delimiter of both input files
    #[arg(long)]
    delimiter: Option<char>,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(v) = &self.table_name {
            config.output.table_name = v.clone();
        }
        if let Some(v) = self.if_exists {
            config.output.if_exists = v;
        }
        if let Some(v) = self.merge_strategy {
            config.reshape.merge_strategy = v;
        }
        if let Some(v) = self.schema_policy {
            config.reshape.schema_policy = v;
        }
        if let Some(v) = self.dedup_policy {
            config.reshape.dedup_policy = v;
        }
        if let Some(v) = self.delimiter {
            config.input.delimiter = v;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let [records_path, categories_path, database_path]: [PathBuf; 3] =
        match cli.paths.clone().try_into() {
            Ok(paths) => paths,
            Err(_) => {
                println!("{USAGE}");
                return Ok(());
            }
        };

    dotenv::dotenv().ok();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let _log_guard = logging::init_logging(&config.logging)?;
    debug!("Effective configuration: {:?}", config);

    let pipeline = Pipeline::new(config);
    let result = match pipeline.run(&records_path, &categories_path, &database_path) {
        Ok(result) => result,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            return Err(e).context("Failed to process data");
        }
    };

    if let Some(report) = &cli.report {
        result.write_report(report)?;
    }
    Ok(())
}
