// Storage: persistence of the reshaped table

pub mod sqlite;

pub use sqlite::{save_data, SaveSummary, SinkOptions, SqliteSink};
