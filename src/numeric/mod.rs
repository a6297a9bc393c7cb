//! Stateless helpers over burn tensors and state dictionaries.

mod autograd;
mod encoding;
mod gaussian;
mod params;

pub use autograd::{hessian_matrix, jacobian, HESSIAN_STEP};
pub use encoding::{logit, one_hot_encode};
pub use gaussian::{analyze_latent_space, log_pz, sample, ClassGaussian};
pub use params::{
    lora_state_dict, params_count, separate_bn_params, set_lora_configs_all, LoraLayer, LoraModel,
};
