use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::checkpoint::Records;
use crate::training::data::{Batches, BatchLoader, DataRegistry, Dataset};

/// Mutable run state handed to the experiment hooks.
pub struct RunContext<I> {
    /// Epochs completed so far.
    pub epoch: usize,
    /// Persisted with every checkpoint.
    pub records: Records,
    /// Printed by [`RunContext::print_logs`]; never persisted.
    pub logs: Records,
    pub rng: StdRng,
    pub(crate) data: DataRegistry<I>,
    pub(crate) sink_attached: bool,
}

impl<I> RunContext<I> {
    pub(crate) fn new(seed: u64) -> Self {
        RunContext {
            epoch: 0,
            records: Records::new(),
            logs: Records::new(),
            rng: StdRng::seed_from_u64(seed),
            data: DataRegistry::new(),
            sink_attached: false,
        }
    }

    pub fn dataset(&self, name: &str) -> Option<Arc<dyn Dataset<I>>> {
        self.data.dataset(name).cloned()
    }

    pub fn loader(&mut self, name: &str) -> Option<&mut BatchLoader<I>> {
        self.data.loader_mut(name)
    }

    /// Start a pass over the named loader.
    pub fn batches(&mut self, name: &str) -> Option<Batches<I>> {
        self.data.loader_mut(name).map(BatchLoader::iter)
    }

    pub fn loader_names(&self) -> Vec<String> {
        self.data.loader_names().map(str::to_string).collect()
    }

    /// `Epoch/Iteration:EEE/SSSS key:value ...` over the current logs.
    pub fn format_logs(&self, epoch: usize, step: usize) -> String {
        let mut msg = format!("Epoch/Iteration:{epoch:03}/{step:04} ");
        for (key, value) in &self.logs {
            msg.push_str(&format!("{key}:{value} "));
        }
        msg
    }

    pub fn print_logs(&self, epoch: usize, step: usize) {
        let msg = self.format_logs(epoch, step);
        if self.sink_attached {
            info!("{msg}");
        } else {
            println!("{msg}");
        }
    }
}
