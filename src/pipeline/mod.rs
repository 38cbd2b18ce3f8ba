// Data processing pipeline: ingestion, processing, and storage

pub mod ingestion;
pub mod pipeline;
pub mod processing;
pub mod storage;

// Re-export key types and functions from each stage
pub use ingestion::load_data;
pub use pipeline::{Pipeline, PipelineResult};
pub use processing::reshape;
pub use storage::save_data;
