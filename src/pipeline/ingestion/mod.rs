// Ingestion: delimited-text sources into in-memory tables

pub mod loader;

pub use loader::{load_data, Loader};
