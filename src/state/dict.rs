use std::collections::BTreeMap;

use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// One module parameter, laid out like burn's own parameter record.
/// `id` is the burn parameter id, so optimizer state keyed by it still lines
/// up after a restart; `param` keeps the stored element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub id: String,
    pub param: TensorData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateValue {
    Tensor(TensorRecord),
    Scalar(f64),
    Bytes(Vec<u8>),
}

impl StateValue {
    fn kind(&self) -> &'static str {
        match self {
            StateValue::Tensor(_) => "tensor",
            StateValue::Scalar(_) => "scalar",
            StateValue::Bytes(_) => "bytes",
        }
    }
}

/// Named sub-state of one component, ordered by key.
pub type StateDict = BTreeMap<String, StateValue>;

/// How strictly a state dictionary must match the component it is loaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Every expected key must be present and nothing else may be.
    Strict,
    /// Keys present on only one side are skipped and reported.
    Tolerant,
}

/// Which keys a load applied, skipped, or ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// A component whose state can be checkpointed.
pub trait Stateful {
    fn state_dict(&self) -> Result<StateDict, StateError>;

    fn load_state_dict(
        &mut self,
        state: &StateDict,
        mode: LoadMode,
    ) -> Result<LoadReport, StateError>;
}

impl<T: Stateful + ?Sized> Stateful for &mut T {
    fn state_dict(&self) -> Result<StateDict, StateError> {
        (**self).state_dict()
    }

    fn load_state_dict(
        &mut self,
        state: &StateDict,
        mode: LoadMode,
    ) -> Result<LoadReport, StateError> {
        (**self).load_state_dict(state, mode)
    }
}

/// Reads entries out of a [`StateDict`] while tracking what was consumed.
///
/// Call [`StateLoader::finish`] once every expected key was requested; in
/// strict mode it rejects leftovers.
pub struct StateLoader<'a> {
    state: &'a StateDict,
    mode: LoadMode,
    report: LoadReport,
}

impl<'a> StateLoader<'a> {
    pub fn new(state: &'a StateDict, mode: LoadMode) -> Self {
        StateLoader {
            state,
            mode,
            report: LoadReport::default(),
        }
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    fn entry(&mut self, key: &str) -> Result<Option<&'a StateValue>, StateError> {
        match self.state.get(key) {
            Some(value) => {
                self.report.loaded.push(key.to_string());
                Ok(Some(value))
            }
            None if self.mode == LoadMode::Strict => Err(StateError::MissingKey(key.to_string())),
            None => {
                self.report.missing.push(key.to_string());
                Ok(None)
            }
        }
    }

    pub fn tensor(&mut self, key: &str) -> Result<Option<&'a TensorRecord>, StateError> {
        match self.entry(key)? {
            None => Ok(None),
            Some(StateValue::Tensor(record)) => Ok(Some(record)),
            Some(other) => Err(StateError::KindMismatch {
                key: key.to_string(),
                expected: "tensor",
                found: other.kind(),
            }),
        }
    }

    pub fn scalar(&mut self, key: &str) -> Result<Option<f64>, StateError> {
        match self.entry(key)? {
            None => Ok(None),
            Some(StateValue::Scalar(value)) => Ok(Some(*value)),
            Some(other) => Err(StateError::KindMismatch {
                key: key.to_string(),
                expected: "scalar",
                found: other.kind(),
            }),
        }
    }

    pub fn bytes(&mut self, key: &str) -> Result<Option<&'a [u8]>, StateError> {
        match self.entry(key)? {
            None => Ok(None),
            Some(StateValue::Bytes(bytes)) => Ok(Some(bytes.as_slice())),
            Some(other) => Err(StateError::KindMismatch {
                key: key.to_string(),
                expected: "bytes",
                found: other.kind(),
            }),
        }
    }

    pub fn finish(mut self) -> Result<LoadReport, StateError> {
        let unexpected: Vec<String> = self
            .state
            .keys()
            .filter(|key| !self.report.loaded.contains(key))
            .cloned()
            .collect();
        if self.mode == LoadMode::Strict && !unexpected.is_empty() {
            return Err(StateError::UnexpectedKeys(unexpected));
        }
        self.report.unexpected = unexpected;
        Ok(self.report)
    }
}

/// Join a layer prefix and a parameter name with a dot.
pub fn join_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> StateDict {
        let mut state = StateDict::new();
        state.insert(
            "fc.weight".to_string(),
            StateValue::Tensor(TensorRecord {
                id: "fc-weight".to_string(),
                param: TensorData::new(vec![0.5f32, -0.5], [2]),
            }),
        );
        state.insert("last_epoch".to_string(), StateValue::Scalar(3.0));
        state
    }

    #[test]
    fn test_strict_load_of_matching_state() {
        let state = sample_state();
        let mut loader = StateLoader::new(&state, LoadMode::Strict);
        let weight = loader.tensor("fc.weight").unwrap().unwrap();
        assert_eq!(weight.param.shape, vec![2]);
        assert_eq!(weight.param.to_vec::<f32>().unwrap(), vec![0.5, -0.5]);
        assert_eq!(loader.scalar("last_epoch").unwrap(), Some(3.0));
        let report = loader.finish().unwrap();
        assert!(report.is_complete());
        assert_eq!(report.loaded.len(), 2);
    }

    #[test]
    fn test_strict_missing_key_fails() {
        let state = sample_state();
        let mut loader = StateLoader::new(&state, LoadMode::Strict);
        let err = loader.tensor("fc.bias").unwrap_err();
        assert!(matches!(err, StateError::MissingKey(key) if key == "fc.bias"));
    }

    #[test]
    fn test_strict_unexpected_key_fails() {
        let state = sample_state();
        let mut loader = StateLoader::new(&state, LoadMode::Strict);
        loader.tensor("fc.weight").unwrap();
        let err = loader.finish().unwrap_err();
        assert!(matches!(err, StateError::UnexpectedKeys(keys) if keys == vec!["last_epoch"]));
    }

    #[test]
    fn test_tolerant_reports_both_sides() {
        let state = sample_state();
        let mut loader = StateLoader::new(&state, LoadMode::Tolerant);
        assert!(loader.tensor("fc.bias").unwrap().is_none());
        assert!(loader.tensor("fc.weight").unwrap().is_some());
        let report = loader.finish().unwrap();
        assert_eq!(report.missing, vec!["fc.bias"]);
        assert_eq!(report.unexpected, vec!["last_epoch"]);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_kind_mismatch_fails_in_either_mode() {
        let state = sample_state();
        let mut loader = StateLoader::new(&state, LoadMode::Tolerant);
        let err = loader.scalar("fc.weight").unwrap_err();
        assert!(matches!(
            err,
            StateError::KindMismatch {
                expected: "scalar",
                found: "tensor",
                ..
            }
        ));
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("encoder.fc1", "weight"), "encoder.fc1.weight");
        assert_eq!(join_key("", "weight"), "weight");
    }
}
