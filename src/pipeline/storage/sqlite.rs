use metrics::counter;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ToSql};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, IfExists};
use crate::constants::DEFAULT_TABLE_NAME;
use crate::error::{EtlError, Result};
use crate::types::{Cell, ColumnKind, WideTable};

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(Value::Null),
            Cell::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Cell::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub table_name: String,
    pub if_exists: IfExists,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            if_exists: IfExists::default(),
        }
    }
}

impl From<&Config> for SinkOptions {
    fn from(config: &Config) -> Self {
        Self {
            table_name: config.output.table_name.clone(),
            if_exists: config.output.if_exists,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveSummary {
    pub table_name: String,
    pub rows_written: usize,
    pub replaced_existing: bool,
}

/// Writes a [`WideTable`] into one named table of a SQLite database file.
///
/// The whole write is a single transaction: the file ends up with either
/// its previous content or the complete new table.
pub struct SqliteSink {
    path: PathBuf,
    options: SinkOptions,
}

impl SqliteSink {
    pub fn new<P: AsRef<Path>>(path: P, options: SinkOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options,
        }
    }

    #[instrument(skip_all, fields(path = %self.path.display(), table = %self.options.table_name))]
    pub fn write(&self, table: &WideTable) -> Result<SaveSummary> {
        if table.columns.is_empty() {
            return Err(EtlError::write(&self.path, "table has no columns to store"));
        }

        // Connection is dropped on every return path below
        let mut conn = Connection::open(&self.path).map_err(|e| self.write_error(e))?;
        let tx = conn.transaction().map_err(|e| self.write_error(e))?;

        let name = &self.options.table_name;
        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                params![name],
                |row| row.get(0),
            )
            .map_err(|e| self.write_error(e))?;

        let replaced_existing = match (exists, self.options.if_exists) {
            (true, IfExists::Fail) => {
                return Err(self.write_error(format!("table '{name}' already exists")));
            }
            (true, IfExists::Replace) => {
                warn!("Replacing existing table '{}'", name);
                tx.execute_batch(&format!("DROP TABLE {}", quote_ident(name)))
                    .map_err(|e| self.write_error(e))?;
                true
            }
            (false, _) => false,
        };

        let ddl = create_table_sql(name, table);
        debug!("{}", ddl);
        tx.execute_batch(&ddl).map_err(|e| self.write_error(e))?;

        {
            let mut stmt = tx
                .prepare(&insert_sql(name, table.columns.len()))
                .map_err(|e| self.write_error(e))?;
            for row in &table.rows {
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(|e| self.write_error(e))?;
            }
        }
        tx.commit().map_err(|e| self.write_error(e))?;

        counter!("etl_rows_written_total").increment(table.len() as u64);
        info!("Wrote {} rows to table '{}'", table.len(), name);
        Ok(SaveSummary {
            table_name: name.clone(),
            rows_written: table.len(),
            replaced_existing,
        })
    }

    fn write_error(&self, reason: impl ToString) -> EtlError {
        EtlError::write(&self.path, reason)
    }
}

/// Persist `table` to the SQLite database at `database_path`.
pub fn save_data<P: AsRef<Path>>(
    table: &WideTable,
    database_path: P,
    options: &SinkOptions,
) -> Result<SaveSummary> {
    SqliteSink::new(database_path, options.clone()).write(table)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_table_sql(name: &str, table: &WideTable) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let ty = match c.kind {
                ColumnKind::Text => "TEXT",
                ColumnKind::Integer => "INTEGER",
            };
            format!("{} {}", quote_ident(&c.name), ty)
        })
        .collect();
    format!("CREATE TABLE {} ({})", quote_ident(name), columns.join(", "))
}

fn insert_sql(name: &str, width: usize) -> String {
    let placeholders: Vec<String> = (1..=width).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(name),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;
    use tempfile::tempdir;

    fn wide() -> WideTable {
        WideTable {
            columns: vec![
                Column::text("message"),
                Column::text("genre"),
                Column::integer("related"),
                Column::integer("request"),
            ],
            rows: vec![
                vec!["help".into(), "direct".into(), Cell::Integer(1), Cell::Integer(0)],
                vec!["water \"now\"".into(), Cell::Null, Cell::Integer(1), Cell::Integer(1)],
            ],
        }
    }

    fn count_rows(path: &Path, table: &str) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_writes_typed_columns() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let db = dir.path().join("out.db");

        let summary = save_data(&wide(), &db, &SinkOptions::default())?;
        assert_eq!(summary.rows_written, 2);
        assert!(!summary.replaced_existing);

        let conn = Connection::open(&db)?;
        let (message, genre, related): (String, Option<String>, i64) = conn.query_row(
            "SELECT message, genre, related FROM df WHERE request = 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        assert_eq!(message, "water \"now\"");
        assert_eq!(genre, None);
        assert_eq!(related, 1);

        let related_type: String =
            conn.query_row("SELECT typeof(related) FROM df LIMIT 1", [], |r| r.get(0))?;
        assert_eq!(related_type, "integer");
        Ok(())
    }

    #[test]
    fn test_fail_policy_refuses_existing_table() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let db = dir.path().join("out.db");
        save_data(&wide(), &db, &SinkOptions::default())?;

        let err = save_data(&wide(), &db, &SinkOptions::default()).unwrap_err();
        assert!(matches!(err, EtlError::Write { ref reason, .. } if reason.contains("already exists")));
        // Nothing appended
        assert_eq!(count_rows(&db, "df"), 2);
        Ok(())
    }

    #[test]
    fn test_replace_policy_overwrites() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let db = dir.path().join("out.db");
        let options = SinkOptions {
            table_name: "messages".to_string(),
            if_exists: IfExists::Replace,
        };
        save_data(&wide(), &db, &options)?;

        let mut smaller = wide();
        smaller.rows.truncate(1);
        let summary = save_data(&smaller, &db, &options)?;

        assert!(summary.replaced_existing);
        assert_eq!(count_rows(&db, "messages"), 1);
        Ok(())
    }

    #[test]
    fn test_failed_replace_keeps_previous_table() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let db = dir.path().join("out.db");
        save_data(&wide(), &db, &SinkOptions::default())?;

        // Second row is wider than the declared columns, so its insert fails mid-write
        let broken = WideTable {
            columns: vec![Column::text("message")],
            rows: vec![
                vec!["first".into()],
                vec!["second".into(), Cell::Integer(1)],
            ],
        };
        let options = SinkOptions {
            if_exists: IfExists::Replace,
            ..SinkOptions::default()
        };
        let err = save_data(&broken, &db, &options).unwrap_err();
        assert!(matches!(err, EtlError::Write { .. }));

        assert_eq!(count_rows(&db, "df"), 2);
        let conn = Connection::open(&db)?;
        let related: i64 =
            conn.query_row("SELECT SUM(related) FROM df", [], |r| r.get(0))?;
        assert_eq!(related, 2);
        Ok(())
    }

    #[test]
    fn test_unwritable_destination_is_write_error() {
        let err = save_data(
            &wide(),
            "/nonexistent-dir/sub/out.db",
            &SinkOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EtlError::Write { .. }));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("df"), "\"df\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
