use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore, ComponentKind};
use crate::config::TrainerConfig;
use crate::error::{CheckpointError, TrainerError};
use crate::logging::{notice, LogSink};
use crate::state::LoadMode;
use crate::training::context::RunContext;
use crate::training::data::{Dataset, DatasetRole};
use crate::training::experiment::Experiment;
use crate::utils::{set_seed, Timer};

/// Switches for [`Trainer::main`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Restore the best checkpoint once all epochs are done.
    pub load_best: bool,
    /// Start from the current state instead of the latest checkpoint.
    pub retrain: bool,
    /// Drop the log sink when the run ends.
    pub detach_logger: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            load_best: false,
            retrain: false,
            detach_logger: true,
        }
    }
}

/// How a [`Trainer::run`] ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        epoch: usize,
        best_epoch: Option<usize>,
    },
    Failed {
        epoch: usize,
        error: TrainerError,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// Drives an [`Experiment`] through its epochs, persisting state after each.
pub struct Trainer<E: Experiment> {
    config: TrainerConfig,
    store: CheckpointStore,
    experiment: E,
    ctx: RunContext<E::Item>,
    sink: Option<LogSink>,
}

fn ensure_dir(path: &Path) -> Result<(), TrainerError> {
    if !path.exists() {
        println!("{} does not exist. Creating...", path.display());
        fs::create_dir_all(path).map_err(|e| TrainerError::CreateDir {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<E: Experiment> Trainer<E> {
    pub fn new(config: TrainerConfig, experiment: E) -> Result<Self, TrainerError> {
        config.validate()?;
        ensure_dir(&config.checkpoint_path)?;
        ensure_dir(&config.log_path)?;

        let store = CheckpointStore::new(&config.checkpoint_path, &config.flag);
        let ctx = RunContext::new(config.seed);
        Ok(Trainer {
            config,
            store,
            experiment,
            ctx,
            sink: None,
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn experiment(&self) -> &E {
        &self.experiment
    }

    pub fn experiment_mut(&mut self) -> &mut E {
        &mut self.experiment
    }

    pub fn context(&self) -> &RunContext<E::Item> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RunContext<E::Item> {
        &mut self.ctx
    }

    pub fn epoch(&self) -> usize {
        self.ctx.epoch
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn add_dataset(&mut self, name: impl Into<String>, dataset: impl Dataset<E::Item> + 'static) {
        self.register(DatasetRole::General, name.into(), Arc::new(dataset));
    }

    pub fn add_train_set(&mut self, name: impl Into<String>, dataset: impl Dataset<E::Item> + 'static) {
        self.register(DatasetRole::Train, name.into(), Arc::new(dataset));
    }

    pub fn add_eval_set(&mut self, name: impl Into<String>, dataset: impl Dataset<E::Item> + 'static) {
        self.register(DatasetRole::Eval, name.into(), Arc::new(dataset));
    }

    fn register(&mut self, role: DatasetRole, name: String, dataset: Arc<dyn Dataset<E::Item>>) {
        debug!(?role, name = name.as_str(), len = dataset.len(), "registered dataset");
        self.ctx.data.insert(role, name, dataset);
    }

    /// Build a loader for every registered dataset, replacing earlier ones.
    pub fn prepare_loaders(&mut self) {
        self.ctx.data.prepare(
            self.config.batch_size,
            self.config.is_accelerated(),
            self.config.seed,
        );
    }

    /// Write the current state as the latest checkpoint, and as the best one
    /// when `is_best`. The stored epoch is the number of completed epochs.
    pub fn save(&mut self, is_best: bool) -> Result<PathBuf, TrainerError> {
        let mut checkpoint = Checkpoint {
            epoch: self.ctx.epoch + 1,
            records: self.ctx.records.clone(),
            ..Default::default()
        };

        let components = self.experiment.components();
        let groups = [
            (ComponentKind::Optimizer, &components.optimizers),
            (ComponentKind::Model, &components.models),
            (ComponentKind::Scheduler, &components.schedulers),
        ];
        for (kind, group) in groups {
            for (name, component) in group.iter() {
                let state = component.state_dict().map_err(|e| TrainerError::Export {
                    key: kind.key(name),
                    source: e,
                })?;
                checkpoint.insert_component(kind, name, state);
            }
        }

        let path = self.store.save(&checkpoint, is_best)?;
        debug!(epoch = checkpoint.epoch, is_best, "saved checkpoint");
        Ok(path)
    }

    /// Restore from the latest or best checkpoint. Returns the restored
    /// epoch, or `None` when no checkpoint exists.
    pub fn load(&mut self, is_best: bool) -> Result<Option<usize>, TrainerError> {
        let Some(checkpoint) = self.store.load(is_best)? else {
            return Ok(None);
        };
        self.ctx.epoch = checkpoint.epoch;
        self.ctx.records = checkpoint.records.clone();

        let mut components = self.experiment.components();

        for (name, optimizer) in components.optimizers.iter_mut() {
            let key = ComponentKind::Optimizer.key(name);
            let state = checkpoint
                .component(ComponentKind::Optimizer, name)
                .ok_or_else(|| CheckpointError::MissingComponent(key.clone()))?;
            optimizer
                .load_state_dict(state, LoadMode::Strict)
                .map_err(|e| CheckpointError::Restore { key, source: e })?;
        }

        for (name, model) in components.models.iter_mut() {
            let key = ComponentKind::Model.key(name);
            let Some(state) = checkpoint.component(ComponentKind::Model, name) else {
                warn!("=> '{key}' not in checkpoint, keeping current weights");
                continue;
            };
            let report = model
                .load_state_dict(state, LoadMode::Tolerant)
                .map_err(|e| CheckpointError::Restore { key: key.clone(), source: e })?;
            if !report.is_complete() {
                warn!(
                    "=> '{key}' partially restored: missing {:?}, unexpected {:?}",
                    report.missing, report.unexpected
                );
            }
        }

        for (name, scheduler) in components.schedulers.iter_mut() {
            let key = ComponentKind::Scheduler.key(name);
            let state = checkpoint
                .component(ComponentKind::Scheduler, name)
                .ok_or_else(|| CheckpointError::MissingComponent(key.clone()))?;
            scheduler
                .load_state_dict(state, LoadMode::Strict)
                .map_err(|e| CheckpointError::Restore { key, source: e })?;
        }

        notice(&format!("=> loaded checkpoint (epoch {})", checkpoint.epoch));
        Ok(Some(checkpoint.epoch))
    }

    /// Seed, attach the log sink, resume, then train the remaining epochs.
    /// Returns the best epoch when `load_best` restored one.
    pub fn main(&mut self, options: RunOptions) -> Result<Option<usize>, TrainerError> {
        self.ctx.rng = set_seed::<E::Backend>(self.config.seed);
        self.ctx.data.reseed();
        self.attach_logger()?;

        if !options.retrain {
            self.load(false)?;
        }

        let mut timer = Timer::new(self.config.epochs.saturating_sub(self.ctx.epoch));
        timer.init();
        while self.ctx.epoch < self.config.epochs {
            let epoch = self.ctx.epoch;
            let loss = self
                .experiment
                .train(&mut self.ctx, epoch)
                .map_err(|source| TrainerError::Hook {
                    hook: "train",
                    epoch,
                    source,
                })?;
            debug!(epoch, loss, "train hook finished");

            let is_best = self
                .experiment
                .evaluate(&mut self.ctx, epoch)
                .map_err(|source| TrainerError::Hook {
                    hook: "evaluate",
                    epoch,
                    source,
                })?;

            timer.step();
            self.save(is_best)?;
            self.ctx.epoch += 1;
            self.experiment.scheduler_step(&mut self.ctx);
        }

        let mut best_epoch = None;
        if options.load_best {
            best_epoch = self.load(true)?;
            info!("Best epoch: {:03}", self.ctx.epoch);
        }

        if options.detach_logger {
            self.detach_logger();
        }
        Ok(best_epoch)
    }

    /// [`Trainer::main`], with failures and panics logged and reported
    /// instead of propagated.
    pub fn run(&mut self, options: RunOptions) -> RunOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.main(options)))
            .unwrap_or_else(|payload| {
                Err(TrainerError::Panicked {
                    epoch: self.ctx.epoch,
                    message: panic_message(payload.as_ref()),
                })
            });
        match result {
            Ok(best_epoch) => RunOutcome::Completed {
                epoch: self.ctx.epoch,
                best_epoch,
            },
            Err(e) => {
                let epoch = self.ctx.epoch;
                if self.ctx.sink_attached {
                    error!("run failed at epoch {epoch}: {e}");
                } else {
                    eprintln!("Error: {e}");
                }
                if options.detach_logger {
                    self.detach_logger();
                }
                RunOutcome::Failed { epoch, error: e }
            }
        }
    }

    fn attach_logger(&mut self) -> Result<(), TrainerError> {
        // Close the previous sink first so its file handle is released.
        self.sink = None;
        self.sink = Some(LogSink::open(&self.config.log_path, &self.config.flag)?);
        self.ctx.sink_attached = true;
        Ok(())
    }

    pub fn detach_logger(&mut self) {
        self.sink = None;
        self.ctx.sink_attached = false;
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(LogSink::path)
    }
}
