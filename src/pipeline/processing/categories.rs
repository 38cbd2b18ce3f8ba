//! Unpivoting of encoded category strings.
//!
//! An encoded string packs one `name-value` token per label, joined by `;`:
//! `related-1;request-0;offer-0`. The label name is the token minus its last
//! two characters and the value is its last character, coerced to an integer.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::config::SchemaPolicy;
use crate::constants::{TOKEN_SEPARATOR, TOKEN_SUFFIX_LEN};
use crate::error::{EtlError, Result};
use crate::types::Cell;

/// Derived category columns: label names plus one row of values per input row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryColumns {
    pub names: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

pub fn split_tokens(encoded: &str) -> Vec<&str> {
    encoded.split(TOKEN_SEPARATOR).collect()
}

/// Label name of a token: every character except the last two.
pub fn token_name(token: &str, row: usize) -> Result<&str> {
    let cut = token
        .char_indices()
        .rev()
        .nth(TOKEN_SUFFIX_LEN - 1)
        .map(|(i, _)| i)
        .ok_or_else(|| EtlError::parse(row, token, "expected '<name>-<value>'"))?;
    let name = &token[..cut];
    if name.is_empty() {
        return Err(EtlError::parse(row, token, "empty label name"));
    }
    Ok(name)
}

/// Value of a token: its last character as a non-negative integer. Any digit
/// is accepted, not only `0`/`1`.
pub fn token_value(token: &str, row: usize) -> Result<i64> {
    let last = token
        .chars()
        .last()
        .ok_or_else(|| EtlError::parse(row, token, "empty token"))?;
    last.to_digit(10)
        .map(i64::from)
        .ok_or_else(|| EtlError::parse(row, token, format!("value '{last}' is not numeric")))
}

/// Column names derived from a single encoded string, in token order.
pub fn derive_column_names(encoded: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for token in split_tokens(encoded) {
        let name = token_name(token, 0)?;
        if !seen.insert(name) {
            return Err(EtlError::Shape(format!(
                "category label '{name}' appears twice in the first row"
            )));
        }
        names.push(name.to_string());
    }
    Ok(names)
}

/// Expand encoded category strings into named integer columns.
///
/// `encoded` holds one entry per category row, in source order; `None` marks
/// an empty field. Every derived column is coerced to an integer.
pub fn unpivot(encoded: &[Option<&str>], policy: SchemaPolicy) -> Result<CategoryColumns> {
    if encoded.is_empty() {
        warn!("No category rows; no category columns will be derived");
        return Ok(CategoryColumns::default());
    }
    let columns = match policy {
        SchemaPolicy::FirstRow | SchemaPolicy::Strict => unpivot_positional(encoded, policy)?,
        SchemaPolicy::Union => unpivot_union(encoded)?,
    };
    debug!(
        "Derived {} category columns over {} rows ({})",
        columns.names.len(),
        columns.rows.len(),
        policy
    );
    Ok(columns)
}

fn require(encoded: Option<&str>, row: usize) -> Result<&str> {
    encoded.ok_or_else(|| EtlError::parse(row, "", "missing encoded category string"))
}

// Names come from row 0 and are applied to every row by position. Under
// `FirstRow` later rows' names are never looked at.
fn unpivot_positional(encoded: &[Option<&str>], policy: SchemaPolicy) -> Result<CategoryColumns> {
    let names = derive_column_names(require(encoded[0], 0)?)?;

    let mut rows = Vec::with_capacity(encoded.len());
    for (row, value) in encoded.iter().enumerate() {
        let tokens = split_tokens(require(*value, row)?);
        if tokens.len() != names.len() {
            return Err(EtlError::Shape(format!(
                "row {row} has {} category tokens, the first row has {}",
                tokens.len(),
                names.len()
            )));
        }
        if policy == SchemaPolicy::Strict {
            for (token, expected) in tokens.iter().zip(&names) {
                let name = token_name(token, row)?;
                if name != expected {
                    return Err(EtlError::Shape(format!(
                        "row {row} has label '{name}' where the first row has '{expected}'"
                    )));
                }
            }
        }
        let values = tokens
            .iter()
            .map(|token| token_value(token, row).map(Cell::Integer))
            .collect::<Result<Vec<_>>>()?;
        rows.push(values);
    }

    Ok(CategoryColumns { names, rows })
}

fn unpivot_union(encoded: &[Option<&str>]) -> Result<CategoryColumns> {
    let mut names: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut parsed: Vec<Vec<(usize, i64)>> = Vec::with_capacity(encoded.len());

    for (row, value) in encoded.iter().enumerate() {
        let mut row_values = Vec::new();
        let mut seen = HashSet::new();
        for token in split_tokens(require(*value, row)?) {
            let name = token_name(token, row)?;
            if !seen.insert(name) {
                return Err(EtlError::Shape(format!(
                    "category label '{name}' appears twice in row {row}"
                )));
            }
            let col = match index.get(name) {
                Some(col) => *col,
                None => {
                    names.push(name.to_string());
                    index.insert(name.to_string(), names.len() - 1);
                    names.len() - 1
                }
            };
            row_values.push((col, token_value(token, row)?));
        }
        parsed.push(row_values);
    }

    let mut incomplete = 0usize;
    let rows = parsed
        .into_iter()
        .map(|row_values| {
            if row_values.len() < names.len() {
                incomplete += 1;
            }
            let mut cells = vec![Cell::Null; names.len()];
            for (col, value) in row_values {
                cells[col] = Cell::Integer(value);
            }
            cells
        })
        .collect();

    if incomplete > 0 {
        warn!(
            "{} of {} category rows lack some of the {} labels; missing values stored as null",
            incomplete,
            encoded.len(),
            names.len()
        );
    }

    Ok(CategoryColumns { names, rows })
}
