//! Column and table name defaults shared by the loader, reshaper and sink.
//! Every one of these can be overridden through `Config`.

// Input columns
pub const DEFAULT_ID_COLUMN: &str = "id";
pub const DEFAULT_CATEGORY_COLUMN: &str = "categories";
/// Sparse free-text column that downstream consumers never read
pub const DEFAULT_SECONDARY_COLUMN: &str = "original";

// Encoded category strings look like `related-1;request-0;offer-0`
pub const TOKEN_SEPARATOR: char = ';';
/// Characters trimmed from the end of a token to get its label name (`-` plus the value)
pub const TOKEN_SUFFIX_LEN: usize = 2;

// Output
pub const DEFAULT_TABLE_NAME: &str = "df";
pub const DEFAULT_DELIMITER: char = ',';

// Configuration sources
pub const DEFAULT_CONFIG_FILE: &str = "etl.toml";
pub const ENV_TABLE_NAME: &str = "ETL_TABLE_NAME";
pub const ENV_IF_EXISTS: &str = "ETL_IF_EXISTS";
pub const ENV_MERGE_STRATEGY: &str = "ETL_MERGE_STRATEGY";
pub const ENV_SCHEMA_POLICY: &str = "ETL_SCHEMA_POLICY";
pub const ENV_DEDUP_POLICY: &str = "ETL_DEDUP_POLICY";
pub const ENV_DELIMITER: &str = "ETL_DELIMITER";
pub const ENV_LOG_LEVEL: &str = "ETL_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "ETL_LOG_DIR";

pub const USAGE: &str = "Please provide the filepaths of the messages and categories \
datasets as the first and second argument respectively, as \
well as the filepath of the database to save the cleaned data \
to as the third argument. \n\nExample: disaster_etl \
disaster_messages.csv disaster_categories.csv \
DisasterResponse.db";
