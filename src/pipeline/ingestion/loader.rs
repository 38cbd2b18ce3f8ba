use csv::ReaderBuilder;
use metrics::counter;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::constants::DEFAULT_DELIMITER;
use crate::error::{EtlError, Result};
use crate::types::{Cell, Table};

/// Reads header-bearing delimited text into a [`Table`], preserving column
/// and row order. No transformation is applied.
#[derive(Debug, Clone, Copy)]
pub struct Loader {
    delimiter: u8,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER as u8)
    }
}

impl Loader {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_table<P: AsRef<Path>>(&self, path: P) -> Result<Table> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| EtlError::read(path, e))?;
        let table = self.load_from_reader(file, path)?;
        info!(
            "Loaded {} rows x {} columns from {}",
            table.len(),
            table.headers.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse delimited text from any reader. `source` only labels errors.
    pub fn load_from_reader<R: Read>(&self, reader: R, source: &Path) -> Result<Table> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| EtlError::read(source, e))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(EtlError::read(source, "missing header row"));
        }

        let mut table = Table::new(headers);
        for record in rdr.records() {
            let record = record.map_err(|e| EtlError::read(source, e))?;
            table.rows.push(record.iter().map(Cell::from_field).collect());
        }
        debug!("Parsed {} data rows from {}", table.len(), source.display());
        Ok(table)
    }
}

/// Load the records and categories sources.
pub fn load_data<P: AsRef<Path>, Q: AsRef<Path>>(
    records_path: P,
    categories_path: Q,
    delimiter: u8,
) -> Result<(Table, Table)> {
    let loader = Loader::new(delimiter);
    let records = loader.load_table(records_path)?;
    counter!("etl_rows_loaded_total", "source" => "records").increment(records.len() as u64);
    let categories = loader.load_table(categories_path)?;
    counter!("etl_rows_loaded_total", "source" => "categories")
        .increment(categories.len() as u64);
    Ok((records, categories))
}
