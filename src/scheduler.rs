use crate::error::StateError;
use crate::state::{LoadMode, LoadReport, StateDict, StateLoader, StateValue, Stateful};

pub trait LrScheduler {
    /// Advance one epoch and return the new learning rate.
    fn step(&mut self) -> f64;
    fn learning_rate(&self) -> f64;
}

/// Multiplies the learning rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct StepLr {
    base_lr: f64,
    gamma: f64,
    step_size: usize,
    last_epoch: usize,
}

impl StepLr {
    pub fn new(base_lr: f64, gamma: f64, step_size: usize) -> Self {
        StepLr {
            base_lr,
            gamma,
            step_size: step_size.max(1),
            last_epoch: 0,
        }
    }

    pub fn last_epoch(&self) -> usize {
        self.last_epoch
    }
}

impl LrScheduler for StepLr {
    fn step(&mut self) -> f64 {
        self.last_epoch += 1;
        self.learning_rate()
    }

    fn learning_rate(&self) -> f64 {
        let decays = (self.last_epoch / self.step_size) as i32;
        self.base_lr * self.gamma.powi(decays)
    }
}

impl Stateful for StepLr {
    fn state_dict(&self) -> Result<StateDict, StateError> {
        let mut state = StateDict::new();
        state.insert("base_lr".to_string(), StateValue::Scalar(self.base_lr));
        state.insert("gamma".to_string(), StateValue::Scalar(self.gamma));
        state.insert(
            "step_size".to_string(),
            StateValue::Scalar(self.step_size as f64),
        );
        state.insert(
            "last_epoch".to_string(),
            StateValue::Scalar(self.last_epoch as f64),
        );
        Ok(state)
    }

    fn load_state_dict(
        &mut self,
        state: &StateDict,
        mode: LoadMode,
    ) -> Result<LoadReport, StateError> {
        let mut loader = StateLoader::new(state, mode);
        let base_lr = loader.scalar("base_lr")?;
        let gamma = loader.scalar("gamma")?;
        let step_size = loader.scalar("step_size")?;
        let last_epoch = loader.scalar("last_epoch")?;
        let report = loader.finish()?;

        if let Some(v) = base_lr {
            self.base_lr = v;
        }
        if let Some(v) = gamma {
            self.gamma = v;
        }
        if let Some(v) = step_size {
            self.step_size = (v as usize).max(1);
        }
        if let Some(v) = last_epoch {
            self.last_epoch = v as usize;
        }
        Ok(report)
    }
}
