use burn::module::Module;
use burn::prelude::Backend;

use crate::state::{ModuleHandle, Stateful};
use crate::training::context::RunContext;

/// Checkpointed parts of an experiment, grouped by role.
///
/// Models restore tolerantly; optimizers and schedulers must match exactly.
#[derive(Default)]
pub struct Components<'a> {
    pub(crate) models: Vec<(String, Box<dyn Stateful + 'a>)>,
    pub(crate) optimizers: Vec<(String, Box<dyn Stateful + 'a>)>,
    pub(crate) schedulers: Vec<(String, Box<dyn Stateful + 'a>)>,
}

impl<'a> Components<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any burn module; its record is checkpointed parameter by parameter.
    pub fn model<B, M>(mut self, name: impl Into<String>, model: &'a mut M) -> Self
    where
        B: Backend,
        M: Module<B>,
    {
        self.models
            .push((name.into(), Box::new(ModuleHandle::<B, M>::new(model))));
        self
    }

    pub fn optimizer(mut self, name: impl Into<String>, optimizer: &'a mut dyn Stateful) -> Self {
        self.optimizers.push((name.into(), Box::new(optimizer)));
        self
    }

    pub fn scheduler(mut self, name: impl Into<String>, scheduler: &'a mut dyn Stateful) -> Self {
        self.schedulers.push((name.into(), Box::new(scheduler)));
        self
    }
}

/// Caller-side hooks driven by [`crate::training::Trainer`].
pub trait Experiment {
    type Backend: Backend;
    type Item: 'static;

    /// Everything that is saved to and restored from checkpoints.
    fn components(&mut self) -> Components<'_> {
        Components::new()
    }

    /// One training epoch; returns the epoch loss.
    fn train(&mut self, _ctx: &mut RunContext<Self::Item>, _epoch: usize) -> anyhow::Result<f64> {
        Ok(0.0)
    }

    /// Returns whether this epoch produced the best model so far.
    fn evaluate(
        &mut self,
        _ctx: &mut RunContext<Self::Item>,
        _epoch: usize,
    ) -> anyhow::Result<bool> {
        Ok(false)
    }

    /// Called once after every saved epoch.
    fn scheduler_step(&mut self, _ctx: &mut RunContext<Self::Item>) {}
}
