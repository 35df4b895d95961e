//! Scraped data: records, resume checkpoints, and output files.

pub mod checkpoint;
pub mod output;
pub mod records;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use output::OutputPaths;
pub use records::{CourseRecord, Field, RunStats, TermDescriptor, Unit};
