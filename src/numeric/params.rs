use burn::module::Module;
use burn::prelude::*;

use crate::error::StateError;
use crate::state::{ModuleState, StateDict};

/// Total number of parameter elements in `module`.
pub fn params_count<B: Backend, M: Module<B>>(module: &M) -> usize {
    module.num_params()
}

fn is_batch_norm_layer(key: &str) -> bool {
    let layer = match key.rsplit_once('.') {
        Some((layer, _)) => layer,
        None => return false,
    };
    layer.split('.').any(|segment| {
        let segment = segment.to_ascii_lowercase();
        segment.contains("batchnorm") || segment.contains("batch_norm") || segment.starts_with("bn")
    })
}

/// Split a model state into `(batch_norm, rest)` by layer name, for optimizer
/// parameter groups that skip weight decay on normalization layers.
pub fn separate_bn_params(state: &StateDict) -> (StateDict, StateDict) {
    state
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .partition(|(key, _)| is_batch_norm_layer(key))
}

/// Only the low-rank adapter entries of `model`'s state.
pub fn lora_state_dict<B: Backend, M: Module<B>>(model: &M) -> Result<StateDict, StateError> {
    let mut state = ModuleState::<B>::state_dict(model)?;
    state.retain(|key, _| key.contains("lora"));
    Ok(state)
}

/// A layer carrying a low-rank adapter.
pub trait LoraLayer {
    fn set_lora_configs(&mut self, rank: usize, alpha: f64);

    fn set_lora_enabled(&mut self, enabled: bool);
}

/// A model exposing its adapter layers.
pub trait LoraModel {
    fn lora_layers_mut(&mut self) -> Vec<&mut dyn LoraLayer>;
}

/// Apply `rank`/`alpha` to every adapter of `model`; enable them when asked.
/// Returns the number of layers touched.
pub fn set_lora_configs_all<M: LoraModel + ?Sized>(
    model: &mut M,
    rank: usize,
    alpha: f64,
    enable_lora: bool,
) -> usize {
    let layers = model.lora_layers_mut();
    let count = layers.len();
    for layer in layers {
        layer.set_lora_configs(rank, alpha);
        if enable_lora {
            layer.set_lora_enabled(true);
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateValue;
    use burn::backend::NdArray;
    use burn::module::Param;
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_params_count_of_linear() {
        let layer = LinearConfig::new(3, 4).init::<TestBackend>(&Default::default());
        assert_eq!(params_count(&layer), 3 * 4 + 4);
    }

    #[test]
    fn test_separate_bn_params() {
        let mut state = StateDict::new();
        for key in [
            "encoder.bn1.weight",
            "encoder.conv1.weight",
            "decoder.BatchNorm.running_mean",
            "head.batch_norm.bias",
            "head.fc.weight",
            "bias",
        ] {
            state.insert(key.to_string(), StateValue::Scalar(0.0));
        }

        let (bn, rest) = separate_bn_params(&state);
        let bn: Vec<&str> = bn.keys().map(String::as_str).collect();
        let rest: Vec<&str> = rest.keys().map(String::as_str).collect();
        assert_eq!(
            bn,
            vec![
                "decoder.BatchNorm.running_mean",
                "encoder.bn1.weight",
                "head.batch_norm.bias"
            ]
        );
        assert_eq!(rest, vec!["bias", "encoder.conv1.weight", "head.fc.weight"]);
    }

    #[derive(Default)]
    struct Adapter {
        rank: usize,
        alpha: f64,
        enabled: bool,
    }

    impl LoraLayer for Adapter {
        fn set_lora_configs(&mut self, rank: usize, alpha: f64) {
            self.rank = rank;
            self.alpha = alpha;
        }

        fn set_lora_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
    }

    #[derive(Default)]
    struct TinyModel {
        q: Adapter,
        v: Adapter,
    }

    impl LoraModel for TinyModel {
        fn lora_layers_mut(&mut self) -> Vec<&mut dyn LoraLayer> {
            vec![&mut self.q, &mut self.v]
        }
    }

    #[derive(Module, Debug)]
    struct LoraLinear<B: Backend> {
        base: Linear<B>,
        lora_a: Param<Tensor<B, 2>>,
        lora_b: Param<Tensor<B, 2>>,
    }

    #[derive(Module, Debug)]
    struct Attention<B: Backend> {
        q: LoraLinear<B>,
        out: Linear<B>,
    }

    #[test]
    fn test_set_lora_configs_all() {
        let mut model = TinyModel::default();
        assert_eq!(set_lora_configs_all(&mut model, 8, 16.0, false), 2);
        assert_eq!(model.q.rank, 8);
        assert_eq!(model.v.alpha, 16.0);
        assert!(!model.q.enabled);

        set_lora_configs_all(&mut model, 4, 8.0, true);
        assert!(model.q.enabled && model.v.enabled);
    }

    #[test]
    fn test_lora_state_dict_keeps_adapters_only() {
        let device = Default::default();
        let model = Attention::<TestBackend> {
            q: LoraLinear {
                base: LinearConfig::new(4, 4).init(&device),
                lora_a: Param::from_tensor(Tensor::zeros([4, 2], &device)),
                lora_b: Param::from_tensor(Tensor::zeros([2, 4], &device)),
            },
            out: LinearConfig::new(4, 4).init(&device),
        };
        let state = lora_state_dict(&model).unwrap();
        let keys: Vec<&str> = state.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["q.lora_a", "q.lora_b"]);
    }
}
