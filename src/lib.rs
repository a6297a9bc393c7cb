//! # trainkit
//!
//! Epoch-loop harness and numeric helpers for experiments built on the Burn
//! ML framework. A [`training::Trainer`] drives a caller's
//! [`training::Experiment`], saving and restoring its models, optimizers and
//! schedulers through JSON checkpoints keyed by a run flag.
//!
//! ## Modules
//!
//! - [`training`] - Trainer, experiment hooks, datasets and batch loaders
//! - [`checkpoint`] - Latest/best checkpoint files
//! - [`state`] - Named state dictionaries and the Burn module record bridge
//! - [`optim`] - Checkpointable wrapper around Burn optimizers
//! - [`scheduler`] - Learning-rate schedules
//! - [`numeric`] - Jacobian/Hessian, latent Gaussians, one-hot, LoRA helpers
//! - [`logging`] - Per-run log file sink
//! - [`utils`] - Seeding and epoch timer
//! - [`config`] - TOML configuration loading and validation
//! - [`error`] - Structured error types

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod logging;
pub mod numeric;
pub mod optim;
pub mod scheduler;
pub mod state;
pub mod training;
pub mod utils;
