use std::marker::PhantomData;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{DoublePrecisionSettings, Record};
use serde_json::Value;

use crate::error::StateError;
use crate::state::dict::{
    join_key, LoadMode, LoadReport, StateDict, StateLoader, StateValue, Stateful, TensorRecord,
};

/// Wide enough that neither f32 nor f64 backends lose bits on a round trip.
type Precision = DoublePrecisionSettings;

type RecordItem<B, M> = <<M as Module<B>>::Record as Record<B>>::Item<Precision>;

/// Checkpoint state of any burn module, taken from its record.
///
/// Keys are the dotted field paths of the module tree (`blocks.0.bn.gamma`),
/// one entry per parameter or running statistic.
pub trait ModuleState<B: Backend> {
    fn state_dict(&self) -> Result<StateDict, StateError>;

    /// Overwrite the parameters named in `state`; in tolerant mode the rest
    /// keep their current values.
    fn load_state_dict(
        &mut self,
        state: &StateDict,
        mode: LoadMode,
    ) -> Result<LoadReport, StateError>;
}

impl<B: Backend, M: Module<B>> ModuleState<B> for M {
    fn state_dict(&self) -> Result<StateDict, StateError> {
        let tree = record_tree::<B, M>(self)?;
        let mut state = StateDict::new();
        for (key, pointer) in param_paths(&tree) {
            if let Some(leaf) = tree.pointer(&pointer) {
                let record: TensorRecord = serde_json::from_value(leaf.clone())?;
                state.insert(key, StateValue::Tensor(record));
            }
        }
        Ok(state)
    }

    fn load_state_dict(
        &mut self,
        state: &StateDict,
        mode: LoadMode,
    ) -> Result<LoadReport, StateError> {
        let mut tree = record_tree::<B, M>(self)?;
        let mut loader = StateLoader::new(state, mode);
        for (key, pointer) in param_paths(&tree) {
            let Some(record) = loader.tensor(&key)? else {
                continue;
            };
            let Some(slot) = tree.pointer_mut(&pointer) else {
                continue;
            };
            let expected: Vec<usize> = match slot.pointer("/param/shape") {
                Some(shape) => serde_json::from_value(shape.clone())?,
                None => Vec::new(),
            };
            if expected != record.param.shape {
                return Err(StateError::ShapeMismatch {
                    key,
                    expected,
                    found: record.param.shape.clone(),
                });
            }
            *slot = serde_json::to_value(record)?;
        }
        let report = loader.finish()?;

        let item: RecordItem<B, M> = serde_json::from_value(tree)?;
        let device = self.devices().into_iter().next().unwrap_or_default();
        let record = <M::Record as Record<B>>::from_item::<Precision>(item, &device);
        *self = self.clone().load_record(record);
        Ok(report)
    }
}

fn record_tree<B: Backend, M: Module<B>>(module: &M) -> Result<Value, StateError> {
    let item = <M::Record as Record<B>>::into_item::<Precision>(module.clone().into_record());
    Ok(serde_json::to_value(item)?)
}

/// A serialized `Param`: exactly `{id, param}`.
fn is_param(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 2 && map.contains_key("id") && map.contains_key("param"),
        _ => false,
    }
}

/// `(dotted key, JSON pointer)` of every parameter in a record tree.
/// Constant fields serialize as `null` and carry no state.
fn param_paths(tree: &Value) -> Vec<(String, String)> {
    fn walk(value: &Value, key: &str, pointer: &str, out: &mut Vec<(String, String)>) {
        if is_param(value) {
            out.push((key.to_string(), pointer.to_string()));
            return;
        }
        match value {
            Value::Object(map) => {
                for (name, child) in map {
                    let escaped = name.replace('~', "~0").replace('/', "~1");
                    walk(child, &join_key(key, name), &format!("{pointer}/{escaped}"), out);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    let index = i.to_string();
                    walk(child, &join_key(key, &index), &format!("{pointer}/{index}"), out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(tree, "", "", &mut out);
    out
}

/// Registers a module with [`crate::training::Components`].
pub(crate) struct ModuleHandle<'a, B, M> {
    module: &'a mut M,
    _backend: PhantomData<B>,
}

impl<'a, B: Backend, M: Module<B>> ModuleHandle<'a, B, M> {
    pub(crate) fn new(module: &'a mut M) -> Self {
        ModuleHandle {
            module,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend, M: Module<B>> Stateful for ModuleHandle<'_, B, M> {
    fn state_dict(&self) -> Result<StateDict, StateError> {
        <M as ModuleState<B>>::state_dict(self.module)
    }

    fn load_state_dict(
        &mut self,
        state: &StateDict,
        mode: LoadMode,
    ) -> Result<LoadReport, StateError> {
        <M as ModuleState<B>>::load_state_dict(self.module, state, mode)
    }
}
