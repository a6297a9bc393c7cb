use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::StateDict;

/// A record or log entry: a number or a free-form string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Number(v) => write!(f, "{v:4.6}"),
            RecordValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for RecordValue {
    fn from(v: f64) -> Self {
        RecordValue::Number(v)
    }
}

impl From<f32> for RecordValue {
    fn from(v: f32) -> Self {
        RecordValue::Number(v as f64)
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::Text(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        RecordValue::Text(s)
    }
}

/// Named scalar metrics persisted alongside component state.
pub type Records = BTreeMap<String, RecordValue>;

/// Role of a checkpointed component; decides its key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Model,
    Optimizer,
    Scheduler,
}

impl ComponentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ComponentKind::Model => "model",
            ComponentKind::Optimizer => "optim",
            ComponentKind::Scheduler => "scheduler",
        }
    }

    /// Checkpoint key of the component registered as `name`.
    pub fn key(self, name: &str) -> String {
        format!("{}_{}", self.prefix(), name)
    }
}

/// One serialized snapshot of a run.
///
/// Serialized flat: `epoch`, `records`, then one `{prefix}_{name}` entry per
/// component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    #[serde(default)]
    pub records: Records,
    #[serde(flatten)]
    pub components: BTreeMap<String, StateDict>,
}

impl Checkpoint {
    pub fn component(&self, kind: ComponentKind, name: &str) -> Option<&StateDict> {
        self.components.get(&kind.key(name))
    }

    pub fn insert_component(&mut self, kind: ComponentKind, name: &str, state: StateDict) {
        self.components.insert(kind.key(name), state);
    }
}
