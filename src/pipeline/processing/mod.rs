// Processing: category unpivoting, merge and deduplication

pub mod categories;
pub mod reshape;

pub use categories::{unpivot, CategoryColumns};
pub use reshape::{reshape, ReshapeOptions, Reshaper};
