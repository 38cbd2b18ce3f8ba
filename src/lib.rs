pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod types;

pub use config::Config;
pub use error::{EtlError, Result};
pub use pipeline::{load_data, reshape, save_data, Pipeline, PipelineResult};
pub use types::{Cell, Column, ColumnKind, Table, WideTable};
