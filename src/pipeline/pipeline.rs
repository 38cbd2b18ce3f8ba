use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::ingestion::load_data;
use crate::pipeline::processing::{ReshapeOptions, Reshaper};
use crate::pipeline::storage::{save_data, SinkOptions};

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub records_path: String,
    pub categories_path: String,
    pub database_path: String,
    pub table_name: String,
    pub records_loaded: usize,
    pub categories_loaded: usize,
    pub rows_written: usize,
    pub duplicates_dropped: usize,
    pub category_columns: Vec<String>,
    pub replaced_existing: bool,
    pub duration_secs: f64,
    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Persist the run report as pretty-printed JSON
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Wrote run report to {}", path.display());
        Ok(())
    }
}

/// Load -> clean -> save, strictly in sequence. Any error aborts the run
/// before the next stage starts.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[instrument(skip_all, fields(records = %records_path.display(), categories = %categories_path.display()))]
    pub fn run(
        &self,
        records_path: &Path,
        categories_path: &Path,
        database_path: &Path,
    ) -> Result<PipelineResult> {
        let started = Instant::now();

        println!(
            "Loading data...\n    MESSAGES: {}\n    CATEGORIES: {}",
            records_path.display(),
            categories_path.display()
        );
        let (records, categories) =
            load_data(records_path, categories_path, self.config.delimiter_byte())?;
        let records_loaded = records.len();
        let categories_loaded = categories.len();

        println!("Cleaning data...");
        let reshaper = Reshaper::with_options(ReshapeOptions::from(&self.config));
        let wide = reshaper.reshape(records, categories)?;

        println!("Saving data...\n    DATABASE: {}", database_path.display());
        let summary = save_data(&wide, database_path, &SinkOptions::from(&self.config))?;

        println!("Cleaned data saved to database!");

        let duration_secs = started.elapsed().as_secs_f64();
        histogram!("etl_pipeline_duration_seconds").record(duration_secs);

        let result = PipelineResult {
            records_path: records_path.display().to_string(),
            categories_path: categories_path.display().to_string(),
            database_path: database_path.display().to_string(),
            table_name: summary.table_name,
            records_loaded,
            categories_loaded,
            rows_written: summary.rows_written,
            duplicates_dropped: records_loaded.saturating_sub(summary.rows_written),
            category_columns: wide.category_names(),
            replaced_existing: summary.replaced_existing,
            duration_secs,
            finished_at: Utc::now(),
        };
        info!(
            "Pipeline finished: {} rows written to '{}' ({} duplicates dropped, {} category columns) in {:.2}s",
            result.rows_written,
            result.table_name,
            result.duplicates_dropped,
            result.category_columns.len(),
            result.duration_secs
        );
        Ok(result)
    }
}
