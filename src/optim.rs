use std::marker::PhantomData;

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::record::{BinBytesRecorder, DoublePrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;

use crate::error::StateError;
use crate::state::{LoadMode, LoadReport, StateDict, StateLoader, StateValue, Stateful};

type OptimRecorder = BinBytesRecorder<DoublePrecisionSettings>;

/// A burn optimizer whose record can be checkpointed.
///
/// The record is stored as an opaque byte blob under `record`, together with
/// the number of steps taken.
pub struct TrackedOptimizer<O, M, B>
where
    B: AutodiffBackend,
{
    inner: O,
    device: B::Device,
    steps: usize,
    _module: PhantomData<M>,
}

impl<O, M, B> TrackedOptimizer<O, M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B> + Clone,
{
    pub fn new(inner: O, device: B::Device) -> Self {
        TrackedOptimizer {
            inner,
            device,
            steps: 0,
            _module: PhantomData,
        }
    }

    /// Apply one update; consumes the module and returns the updated one.
    pub fn step(&mut self, learning_rate: f64, module: M, grads: GradientsParams) -> M {
        self.steps += 1;
        self.inner.step(learning_rate, module, grads)
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl<O, M, B> Stateful for TrackedOptimizer<O, M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B> + Clone,
{
    fn state_dict(&self) -> Result<StateDict, StateError> {
        let recorder = OptimRecorder::default();
        let bytes = <OptimRecorder as Recorder<B>>::record(&recorder, self.inner.to_record(), ())
            .map_err(|e| StateError::Recorder(format!("{e:?}")))?;

        let mut state = StateDict::new();
        state.insert("record".to_string(), StateValue::Bytes(bytes));
        state.insert("steps".to_string(), StateValue::Scalar(self.steps as f64));
        Ok(state)
    }

    fn load_state_dict(
        &mut self,
        state: &StateDict,
        mode: LoadMode,
    ) -> Result<LoadReport, StateError> {
        let mut loader = StateLoader::new(state, mode);
        let bytes = loader.bytes("record")?;
        let steps = loader.scalar("steps")?;
        let report = loader.finish()?;

        if let Some(bytes) = bytes {
            let recorder = OptimRecorder::default();
            let record: O::Record =
                <OptimRecorder as Recorder<B>>::load(&recorder, bytes.to_vec(), &self.device)
                    .map_err(|e| StateError::Recorder(format!("{e:?}")))?;
            self.inner = self.inner.clone().load_record(record);
        }
        if let Some(steps) = steps {
            self.steps = steps as usize;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};
    use burn::optim::adaptor::OptimizerAdaptor;
    use burn::optim::{Adam, AdamConfig};
    use burn::prelude::*;

    type TestBackend = Autodiff<NdArray<f32>>;
    type TestOptimizer = TrackedOptimizer<
        OptimizerAdaptor<Adam, Linear<TestBackend>, TestBackend>,
        Linear<TestBackend>,
        TestBackend,
    >;

    fn one_step(optim: &mut TestOptimizer, model: Linear<TestBackend>) -> Linear<TestBackend> {
        let device = Default::default();
        let input = Tensor::<TestBackend, 2>::ones([4, 2], &device);
        let loss = model.forward(input).powf_scalar(2.0).mean();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        optim.step(1e-2, model, grads)
    }

    #[test]
    fn test_state_roundtrip_after_step() {
        let device = Default::default();
        let model = LinearConfig::new(2, 1).init::<TestBackend>(&device);
        let mut optim: TestOptimizer = TrackedOptimizer::new(AdamConfig::new().init(), device);
        let _model = one_step(&mut optim, model);

        let state = optim.state_dict().unwrap();
        assert!(matches!(state.get("record"), Some(StateValue::Bytes(b)) if !b.is_empty()));

        let mut restored: TestOptimizer =
            TrackedOptimizer::new(AdamConfig::new().init(), Default::default());
        let report = restored.load_state_dict(&state, LoadMode::Strict).unwrap();
        assert!(report.is_complete());
        assert_eq!(restored.steps(), 1);
    }

    #[test]
    fn test_strict_load_without_record_fails() {
        let mut state = StateDict::new();
        state.insert("steps".to_string(), StateValue::Scalar(3.0));

        let mut optim: TestOptimizer =
            TrackedOptimizer::new(AdamConfig::new().init(), Default::default());
        let err = optim.load_state_dict(&state, LoadMode::Strict).unwrap_err();
        assert!(matches!(err, StateError::MissingKey(key) if key == "record"));
        assert_eq!(optim.steps(), 0);
    }
}
