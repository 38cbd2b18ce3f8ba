use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::constants::*;
use crate::error::{EtlError, Result};

/// Runtime configuration, layered as defaults < TOML file < environment < CLI flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub reshape: ReshapeConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub delimiter: char,
    pub id_column: String,
    pub category_column: String,
    /// Record columns removed before merging; absent columns are ignored
    pub drop_columns: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            id_column: DEFAULT_ID_COLUMN.to_string(),
            category_column: DEFAULT_CATEGORY_COLUMN.to_string(),
            drop_columns: vec![DEFAULT_SECONDARY_COLUMN.to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReshapeConfig {
    pub merge_strategy: MergeStrategy,
    pub schema_policy: SchemaPolicy,
    pub dedup_policy: DedupPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub table_name: String,
    pub if_exists: IfExists,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            if_exists: IfExists::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for daily-rolled JSON log files; console only when unset
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// How the record and category tables are combined into one row per record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Row `i` of one input pairs with row `i` of the other; lengths must match
    #[default]
    Positional,
    /// Rows are paired by identifier value
    ById,
}

/// How the category column set is derived from the encoded strings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaPolicy {
    /// Names come from the first row and are applied positionally to all rows
    #[default]
    FirstRow,
    /// Like `FirstRow`, but every row must carry the same names in the same order
    Strict,
    /// Union of names across all rows, matched by name; absent labels are null
    Union,
}

/// Which rows count as duplicates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Rows equal across every output column
    #[default]
    FullRow,
    /// Rows sharing a record identifier; the first one wins
    ById,
}

/// What the sink does when the destination table already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IfExists {
    #[default]
    Fail,
    Replace,
}

macro_rules! kebab_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!(
                        "unknown value '{}', expected one of: {}",
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($ty::$variant => f.write_str($text),)+
                }
            }
        }
    };
}

kebab_enum!(MergeStrategy { Positional => "positional", ById => "by-id" });
kebab_enum!(SchemaPolicy { FirstRow => "first-row", Strict => "strict", Union => "union" });
kebab_enum!(DedupPolicy { FullRow => "full-row", ById => "by-id" });
kebab_enum!(IfExists { Fail => "fail", Replace => "replace" });

impl Config {
    /// Load configuration from `explicit` (which must exist) or from
    /// `etl.toml` in the working directory when present, then apply
    /// environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Override fields from environment variables resolved through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_TABLE_NAME) {
            self.output.table_name = v;
        }
        if let Some(v) = lookup(ENV_IF_EXISTS) {
            self.output.if_exists = parse_env(ENV_IF_EXISTS, &v)?;
        }
        if let Some(v) = lookup(ENV_MERGE_STRATEGY) {
            self.reshape.merge_strategy = parse_env(ENV_MERGE_STRATEGY, &v)?;
        }
        if let Some(v) = lookup(ENV_SCHEMA_POLICY) {
            self.reshape.schema_policy = parse_env(ENV_SCHEMA_POLICY, &v)?;
        }
        if let Some(v) = lookup(ENV_DEDUP_POLICY) {
            self.reshape.dedup_policy = parse_env(ENV_DEDUP_POLICY, &v)?;
        }
        if let Some(v) = lookup(ENV_DELIMITER) {
            let mut chars = v.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => self.input.delimiter = c,
                _ => {
                    return Err(EtlError::Config(format!(
                        "{ENV_DELIMITER} must be a single character, got '{v}'"
                    )))
                }
            }
        }
        if let Some(v) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = v;
        }
        if let Some(v) = lookup(ENV_LOG_DIR) {
            self.logging.log_dir = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.input.delimiter.is_ascii() {
            return Err(EtlError::Config(format!(
                "delimiter must be a single ASCII character, got '{}'",
                self.input.delimiter
            )));
        }
        if self.output.table_name.trim().is_empty() {
            return Err(EtlError::Config("table_name must not be empty".to_string()));
        }
        if self.input.id_column == self.input.category_column {
            return Err(EtlError::Config(format!(
                "id_column and category_column are both '{}'",
                self.input.id_column
            )));
        }
        Ok(())
    }

    /// The delimiter as the single byte the CSV reader expects
    pub fn delimiter_byte(&self) -> u8 {
        self.input.delimiter as u8
    }
}

fn parse_env<T: FromStr<Err = String>>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|e| EtlError::Config(format!("{key}: {e}")))
}
