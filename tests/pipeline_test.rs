use anyhow::Result;
use disaster_etl::config::{Config, IfExists, MergeStrategy};
use disaster_etl::{EtlError, Pipeline};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const MESSAGES_CSV: &str = "\
id,message,original,genre
2,Weather update - a cold front from Cuba,Un front froid se retrouve sur Cuba,direct
7,Is the Hurricane over or is it not over,Cyclone nan fini osinon li pa fini,direct
8,Looking for someone but no name,,direct
8,Looking for someone but no name,,direct
12,\"says: west side of Haiti, rest of the country today\",,news
";

const CATEGORIES_CSV: &str = "\
id,categories
2,related-1;request-0;offer-0;aid_related-0
7,related-1;request-0;offer-0;aid_related-1
8,related-1;request-0;offer-0;aid_related-0
8,related-1;request-0;offer-0;aid_related-0
12,related-2;request-1;offer-0;aid_related-0
";

struct Fixture {
    dir: TempDir,
    records: PathBuf,
    categories: PathBuf,
    database: PathBuf,
}

fn fixture(messages: &str, categories: &str) -> Result<Fixture> {
    let dir = tempdir()?;
    let records = dir.path().join("messages.csv");
    let categories_path = dir.path().join("categories.csv");
    fs::write(&records, messages)?;
    fs::write(&categories_path, categories)?;
    let database = dir.path().join("DisasterResponse.db");
    Ok(Fixture {
        dir,
        records,
        categories: categories_path,
        database,
    })
}

fn run(f: &Fixture, config: Config) -> disaster_etl::Result<disaster_etl::PipelineResult> {
    Pipeline::new(config).run(&f.records, &f.categories, &f.database)
}

fn column_names(db: &Path, table: &str) -> Result<Vec<String>> {
    let conn = Connection::open(db)?;
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

#[test]
fn test_duplicate_messages_saved_once() -> Result<()> {
    let f = fixture(
        "id,message\n1,help\n2,help\n",
        "id,categories\n1,a-1;b-0\n2,a-1;b-0\n",
    )?;

    let result = run(&f, Config::default())?;
    assert_eq!(result.rows_written, 1);
    assert_eq!(result.duplicates_dropped, 1);

    let conn = Connection::open(&f.database)?;
    let rows: Vec<(String, i64, i64)> = conn
        .prepare("SELECT message, a, b FROM df")?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;
    assert_eq!(rows, vec![("help".to_string(), 1, 0)]);
    Ok(())
}

#[test]
fn test_wide_table_schema_and_values() -> Result<()> {
    let f = fixture(MESSAGES_CSV, CATEGORIES_CSV)?;

    let result = run(&f, Config::default())?;

    assert_eq!(result.records_loaded, 5);
    assert_eq!(result.rows_written, 4);
    assert_eq!(
        result.category_columns,
        vec!["related", "request", "offer", "aid_related"]
    );
    assert_eq!(
        column_names(&f.database, "df")?,
        vec!["message", "genre", "related", "request", "offer", "aid_related"]
    );

    let conn = Connection::open(&f.database)?;
    // Non-binary values pass through unchanged
    let related: i64 = conn.query_row(
        "SELECT related FROM df WHERE genre = 'news'",
        [],
        |r| r.get(0),
    )?;
    assert_eq!(related, 2);
    let quoted: String = conn.query_row(
        "SELECT message FROM df WHERE genre = 'news'",
        [],
        |r| r.get(0),
    )?;
    assert_eq!(quoted, "says: west side of Haiti, rest of the country today");
    Ok(())
}

#[test]
fn test_misaligned_inputs_write_nothing() -> Result<()> {
    let f = fixture(
        "id,message\n1,a\n2,b\n3,c\n",
        "id,categories\n1,x-1\n2,x-0\n",
    )?;

    let err = run(&f, Config::default()).unwrap_err();
    assert!(matches!(err, EtlError::Shape(_)));
    assert!(!f.database.exists());
    Ok(())
}

#[test]
fn test_non_numeric_category_value_aborts_run() -> Result<()> {
    let f = fixture(
        "id,message\n1,a\n2,b\n",
        "id,categories\n1,aid-1\n2,aid-x\n",
    )?;

    let err = run(&f, Config::default()).unwrap_err();
    assert!(matches!(err, EtlError::Parse { .. }));
    assert!(!f.database.exists());
    Ok(())
}

#[test]
fn test_second_run_fails_unless_replace() -> Result<()> {
    let f = fixture(MESSAGES_CSV, CATEGORIES_CSV)?;
    run(&f, Config::default())?;

    let err = run(&f, Config::default()).unwrap_err();
    assert!(matches!(err, EtlError::Write { .. }));

    let mut config = Config::default();
    config.output.if_exists = IfExists::Replace;
    let result = run(&f, config)?;
    assert!(result.replaced_existing);

    let conn = Connection::open(&f.database)?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM df", [], |r| r.get(0))?;
    assert_eq!(count, 4);
    Ok(())
}

#[test]
fn test_by_id_merge_handles_shuffled_categories() -> Result<()> {
    let f = fixture(
        "id,message\n1,first\n2,second\n",
        "id,categories\n2,a-0;b-1\n1,a-1;b-0\n",
    )?;
    let mut config = Config::default();
    config.reshape.merge_strategy = MergeStrategy::ById;

    run(&f, config)?;

    let conn = Connection::open(&f.database)?;
    let (a, b): (i64, i64) = conn.query_row(
        "SELECT a, b FROM df WHERE message = 'first'",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    assert_eq!((a, b), (1, 0));
    Ok(())
}

#[test]
fn test_custom_table_name_and_report() -> Result<()> {
    let f = fixture(MESSAGES_CSV, CATEGORIES_CSV)?;
    let mut config = Config::default();
    config.output.table_name = "messages".to_string();

    let result = run(&f, config)?;
    let report = f.dir.path().join("reports").join("run.json");
    result.write_report(&report)?;

    assert_eq!(column_names(&f.database, "messages")?.len(), 6);
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report)?)?;
    assert_eq!(json["table_name"], "messages");
    assert_eq!(json["rows_written"], 4);
    assert_eq!(json["category_columns"][0], "related");
    Ok(())
}

#[test]
fn test_missing_input_is_read_error() -> Result<()> {
    let f = fixture(MESSAGES_CSV, CATEGORIES_CSV)?;
    fs::remove_file(&f.categories)?;

    let err = run(&f, Config::default()).unwrap_err();
    assert!(matches!(err, EtlError::Read { .. }));
    Ok(())
}
