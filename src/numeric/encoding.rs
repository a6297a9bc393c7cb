use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::NumericError;

/// One-hot rows of shape `[labels.len(), n_labels]`.
///
/// Fails on the first label that is negative or `>= n_labels`.
pub fn one_hot_encode(labels: &[i64], n_labels: usize) -> Result<TensorData, NumericError> {
    let mut values = vec![0.0f32; labels.len() * n_labels];
    for (row, &label) in labels.iter().enumerate() {
        let column = usize::try_from(label)
            .ok()
            .filter(|c| *c < n_labels)
            .ok_or(NumericError::LabelOutOfRange { label, n_labels })?;
        values[row * n_labels + column] = 1.0;
    }
    Ok(TensorData::new(values, [labels.len(), n_labels]))
}

/// Element-wise `ln(x / (1 - x))`.
pub fn logit<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let complement = x.clone().neg().add_scalar(1.0);
    x.div(complement).log()
}
