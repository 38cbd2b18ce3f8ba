use metrics::counter;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, DedupPolicy, MergeStrategy, SchemaPolicy};
use crate::constants::{DEFAULT_CATEGORY_COLUMN, DEFAULT_ID_COLUMN, DEFAULT_SECONDARY_COLUMN};
use crate::error::{EtlError, Result};
use crate::pipeline::processing::categories;
use crate::types::{Cell, Column, Table, WideTable};

/// Column names and policies used by [`Reshaper`]
#[derive(Debug, Clone)]
pub struct ReshapeOptions {
    pub id_column: String,
    pub category_column: String,
    pub drop_columns: Vec<String>,
    pub merge_strategy: MergeStrategy,
    pub schema_policy: SchemaPolicy,
    pub dedup_policy: DedupPolicy,
}

impl Default for ReshapeOptions {
    fn default() -> Self {
        Self {
            id_column: DEFAULT_ID_COLUMN.to_string(),
            category_column: DEFAULT_CATEGORY_COLUMN.to_string(),
            drop_columns: vec![DEFAULT_SECONDARY_COLUMN.to_string()],
            merge_strategy: MergeStrategy::default(),
            schema_policy: SchemaPolicy::default(),
            dedup_policy: DedupPolicy::default(),
        }
    }
}

impl From<&Config> for ReshapeOptions {
    fn from(config: &Config) -> Self {
        Self {
            id_column: config.input.id_column.clone(),
            category_column: config.input.category_column.clone(),
            drop_columns: config.input.drop_columns.clone(),
            merge_strategy: config.reshape.merge_strategy,
            schema_policy: config.reshape.schema_policy,
            dedup_policy: config.reshape.dedup_policy,
        }
    }
}

/// Reshape with default options: drop `original`, merge by position, derive
/// category names from the first row, drop fully duplicate rows.
pub fn reshape(records: Table, categories: Table) -> Result<WideTable> {
    Reshaper::default().reshape(records, categories)
}

/// Remove each named column that exists. Returns how many were removed.
pub fn prune_columns(table: &mut Table, columns: &[String]) -> usize {
    columns
        .iter()
        .filter(|column| table.drop_column(column))
        .count()
}

/// Turns a record table and a category table into one [`WideTable`].
#[derive(Debug, Clone, Default)]
pub struct Reshaper {
    options: ReshapeOptions,
}

impl Reshaper {
    pub fn with_options(options: ReshapeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ReshapeOptions {
        &self.options
    }

    /// Under `MergeStrategy::Positional`, row `i` of `records` must describe
    /// the same message as row `i` of `categories`. Only the row counts are
    /// checked; identifier order is not.
    #[instrument(skip_all, fields(records = records.len(), categories = categories.len()))]
    pub fn reshape(&self, mut records: Table, categories: Table) -> Result<WideTable> {
        let opts = &self.options;

        ensure_rectangular(&records, "records")?;
        ensure_rectangular(&categories, "categories")?;

        let pruned = prune_columns(&mut records, &opts.drop_columns);
        debug!("Pruned {} record columns", pruned);

        let category_idx = categories
            .column_index(&opts.category_column)
            .ok_or_else(|| {
                EtlError::Shape(format!(
                    "categories input has no '{}' column",
                    opts.category_column
                ))
            })?;

        let pairs = self.merge_pairs(&records, &categories)?;

        // Parsed in categories source order so the first row is the source's first row
        let encoded: Vec<Option<&str>> = categories
            .rows
            .iter()
            .map(|row| row[category_idx].as_str())
            .collect();
        let derived = categories::unpivot(&encoded, opts.schema_policy)?;

        let category_keep: Vec<usize> = (0..categories.headers.len())
            .filter(|&i| i != category_idx && categories.headers[i] != opts.id_column)
            .collect();
        let record_keep: Vec<usize> = (0..records.headers.len())
            .filter(|&i| records.headers[i] != opts.id_column)
            .collect();

        let columns: Vec<Column> = category_keep
            .iter()
            .map(|&i| Column::text(categories.headers[i].clone()))
            .chain(record_keep.iter().map(|&i| Column::text(records.headers[i].clone())))
            .chain(derived.names.iter().map(|name| Column::integer(name.clone())))
            .collect();
        ensure_unique_columns(&columns)?;

        let record_id = records.column_index(&opts.id_column);
        let category_id = categories.column_index(&opts.id_column);

        let mut rows = Vec::with_capacity(pairs.len());
        let mut ids = Vec::with_capacity(pairs.len());
        for (record_row, category_row) in pairs {
            let record = &records.rows[record_row];
            let category = &categories.rows[category_row];

            let mut row = Vec::with_capacity(columns.len());
            row.extend(category_keep.iter().map(|&i| category[i].clone()));
            row.extend(record_keep.iter().map(|&i| record[i].clone()));
            row.extend(derived.rows[category_row].iter().cloned());
            rows.push(row);

            ids.push(match (record_id, category_id) {
                (Some(i), _) => record[i].clone(),
                (None, Some(i)) => category[i].clone(),
                (None, None) => Cell::Null,
            });
        }

        let merged = rows.len();
        let rows = match opts.dedup_policy {
            DedupPolicy::FullRow => dedup_full_rows(rows),
            DedupPolicy::ById => {
                if record_id.is_none() && category_id.is_none() {
                    return Err(EtlError::Shape(format!(
                        "by-id deduplication needs an '{}' column",
                        opts.id_column
                    )));
                }
                dedup_by_key(rows, &ids)
            }
        };

        let dropped = merged - rows.len();
        counter!("etl_duplicate_rows_dropped_total").increment(dropped as u64);
        info!(
            "Reshaped {} merged rows into {} rows x {} columns ({} duplicates dropped, {} category columns)",
            merged,
            rows.len(),
            columns.len(),
            dropped,
            derived.names.len()
        );

        Ok(WideTable { columns, rows })
    }

    /// Pairs of `(record_row, category_row)` in output order
    fn merge_pairs(&self, records: &Table, categories: &Table) -> Result<Vec<(usize, usize)>> {
        match self.options.merge_strategy {
            MergeStrategy::Positional => {
                if records.len() != categories.len() {
                    return Err(EtlError::Shape(format!(
                        "records has {} rows but categories has {}; positional merge needs row-aligned inputs",
                        records.len(),
                        categories.len()
                    )));
                }
                Ok((0..records.len()).map(|i| (i, i)).collect())
            }
            MergeStrategy::ById => self.join_by_id(records, categories),
        }
    }

    fn join_by_id(&self, records: &Table, categories: &Table) -> Result<Vec<(usize, usize)>> {
        let id_column = &self.options.id_column;
        let missing = |side: &str| {
            EtlError::Shape(format!("{side} input has no '{id_column}' column for by-id merge"))
        };
        let record_id = records.column_index(id_column).ok_or_else(|| missing("records"))?;
        let category_id = categories
            .column_index(id_column)
            .ok_or_else(|| missing("categories"))?;

        let mut by_id: HashMap<&Cell, usize> = HashMap::with_capacity(categories.len());
        for (i, row) in categories.rows.iter().enumerate() {
            let id = &row[category_id];
            if id.is_null() {
                return Err(EtlError::Shape(format!("categories row {i} has an empty identifier")));
            }
            if by_id.insert(id, i).is_some() {
                return Err(EtlError::Shape(format!(
                    "identifier '{id}' appears more than once in categories"
                )));
            }
        }

        let pairs = records
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let id = &row[record_id];
                by_id.get(id).map(|&c| (i, c)).ok_or_else(|| {
                    EtlError::Shape(format!("record row {i} (id '{id}') has no categories row"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let unmatched = categories.len().saturating_sub(pairs.len());
        if unmatched > 0 {
            warn!("{} categories rows have no matching record and are ignored", unmatched);
        }
        Ok(pairs)
    }
}

/// Every row must be exactly as wide as the header; rows are indexed by
/// header position from here on.
fn ensure_rectangular(table: &Table, side: &str) -> Result<()> {
    let width = table.headers.len();
    match table.rows.iter().position(|row| row.len() != width) {
        Some(i) => Err(EtlError::Shape(format!(
            "{side} row {i} has {} fields, the header has {width}",
            table.rows[i].len()
        ))),
        None => Ok(()),
    }
}

fn ensure_unique_columns(columns: &[Column]) -> Result<()> {
    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(EtlError::Shape(format!(
                "output column '{}' would appear twice",
                column.name
            )));
        }
    }
    Ok(())
}

/// Keep the first occurrence of each fully identical row.
pub fn dedup_full_rows(rows: Vec<Vec<Cell>>) -> Vec<Vec<Cell>> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter().filter(|row| seen.insert(row.clone())).collect()
}

/// Keep the first row per key. Rows with a null key are always kept.
pub fn dedup_by_key(rows: Vec<Vec<Cell>>, keys: &[Cell]) -> Vec<Vec<Cell>> {
    let mut seen = HashSet::with_capacity(keys.len());
    rows.into_iter()
        .zip(keys)
        .filter(|(_, key)| key.is_null() || seen.insert(*key))
        .map(|(row, _)| row)
        .collect()
}
