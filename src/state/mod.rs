//! Named sub-state of models, optimizers and schedulers.

mod dict;
mod module;

pub use dict::{
    join_key, LoadMode, LoadReport, StateDict, StateLoader, StateValue, Stateful, TensorRecord,
};
pub(crate) use module::ModuleHandle;
pub use module::ModuleState;
