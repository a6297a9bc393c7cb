//! Epoch loop, run context, and dataset-to-loader wiring.

mod context;
mod data;
mod experiment;
mod trainer;

pub use context::RunContext;
pub use data::{BatchLoader, Batches, Dataset, DatasetRole};
pub use experiment::{Components, Experiment};
pub use trainer::{RunOptions, RunOutcome, Trainer};
