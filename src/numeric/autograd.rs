use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;

use crate::error::NumericError;

/// Central-difference step used by [`hessian_matrix`].
pub const HESSIAN_STEP: f32 = 5e-3;

fn identity(size: usize) -> TensorData {
    let mut values = vec![0.0f32; size * size];
    for i in 0..size {
        values[i * size + i] = 1.0;
    }
    TensorData::new(values, [size, size])
}

/// Jacobian of `fun` at `x` in a single backward pass.
///
/// `x` is replicated `noutputs` times into a `[noutputs, n]` batch; `fun` must
/// map each row independently to `noutputs` outputs, giving a
/// `[noutputs, noutputs]` result. Backpropagating the identity then yields
/// row `i` of the Jacobian in row `i` of the input gradient.
pub fn jacobian<B, F>(
    fun: F,
    x: Tensor<B::InnerBackend, 1>,
    noutputs: usize,
) -> Result<Tensor<B::InnerBackend, 2>, NumericError>
where
    B: AutodiffBackend,
    F: FnOnce(Tensor<B, 2>) -> Tensor<B, 2>,
{
    if noutputs == 0 {
        return Err(NumericError::ShapeMismatch {
            expected: vec![1],
            found: vec![0],
        });
    }
    let replicated = Tensor::cat(vec![x.unsqueeze::<2>(); noutputs], 0);
    let inputs = Tensor::<B, 2>::from_inner(replicated).require_grad();

    let outputs = fun(inputs.clone());
    let dims = outputs.dims();
    if dims != [noutputs, noutputs] {
        return Err(NumericError::ShapeMismatch {
            expected: vec![noutputs, noutputs],
            found: dims.to_vec(),
        });
    }

    let eye = Tensor::<B, 2>::from_data(identity(noutputs), &inputs.device());
    let grads = (outputs * eye).sum().backward();
    inputs.grad(&grads).ok_or(NumericError::MissingGradient)
}

/// Hessian of a scalar function at `x`, as the Jacobian of its gradient.
///
/// `fun` maps a `[m, n]` batch of points to `[m]` values. Gradients are exact
/// autograd gradients; the outer derivative is a central difference with
/// step [`HESSIAN_STEP`], evaluated for all `2n` shifted points in one
/// backward pass. The result is symmetrized.
pub fn hessian_matrix<B, F>(
    fun: F,
    x: Tensor<B::InnerBackend, 1>,
) -> Result<Tensor<B::InnerBackend, 2>, NumericError>
where
    B: AutodiffBackend,
    F: FnOnce(Tensor<B, 2>) -> Tensor<B, 1>,
{
    let [n] = x.dims();
    let device = x.device();
    let center = x
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| NumericError::TensorData(format!("{e:?}")))?;

    let mut points = Vec::with_capacity(2 * n * n);
    for sign in [1.0f32, -1.0] {
        for j in 0..n {
            for (i, value) in center.iter().enumerate() {
                let shift = if i == j { sign * HESSIAN_STEP } else { 0.0 };
                points.push(value + shift);
            }
        }
    }
    let points =
        Tensor::<B::InnerBackend, 2>::from_data(TensorData::new(points, [2 * n, n]), &device);
    let inputs = Tensor::<B, 2>::from_inner(points).require_grad();

    let outputs = fun(inputs.clone());
    let dims = outputs.dims();
    if dims != [2 * n] {
        return Err(NumericError::ShapeMismatch {
            expected: vec![2 * n],
            found: dims.to_vec(),
        });
    }

    let grads = outputs.sum().backward();
    let gradient = inputs.grad(&grads).ok_or(NumericError::MissingGradient)?;
    let plus = gradient.clone().slice([0..n, 0..n]);
    let minus = gradient.slice([n..2 * n, 0..n]);
    let hessian = (plus - minus).div_scalar(2.0 * HESSIAN_STEP);
    Ok((hessian.clone() + hessian.transpose()).div_scalar(2.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type Inner = NdArray<f32>;
    type TestBackend = Autodiff<Inner>;

    fn to_vec(t: Tensor<Inner, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_jacobian_of_linear_map() {
        let device = Default::default();
        // f(x) = A x with A = [[1, 2], [3, 4]]; rows of the batch are x^T.
        let a = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 3.0, 2.0, 4.0], [2, 2]),
            &device,
        );
        let x = Tensor::<Inner, 1>::from_data(TensorData::new(vec![0.5f32, -1.0], [2]), &device);

        let jac = jacobian::<TestBackend, _>(move |xs| xs.matmul(a), x, 2).unwrap();
        assert_eq!(jac.dims(), [2, 2]);
        let values = to_vec(jac);
        for (got, want) in values.iter().zip([1.0f32, 2.0, 3.0, 4.0]) {
            assert!((got - want).abs() < 1e-5, "{values:?}");
        }
    }

    #[test]
    fn test_jacobian_of_elementwise_square() {
        let device = Default::default();
        let x = Tensor::<Inner, 1>::from_data(TensorData::new(vec![1.0f32, 2.0, 3.0], [3]), &device);
        let jac = jacobian::<TestBackend, _>(|xs| xs.powf_scalar(2.0), x, 3).unwrap();
        let values = to_vec(jac);
        let expected = [2.0f32, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 6.0];
        for (got, want) in values.iter().zip(expected) {
            assert!((got - want).abs() < 1e-4, "{values:?}");
        }
    }

    #[test]
    fn test_jacobian_rejects_wrong_output_shape() {
        let device = Default::default();
        let x = Tensor::<Inner, 1>::from_data(TensorData::new(vec![1.0f32, 2.0], [2]), &device);
        let err = jacobian::<TestBackend, _>(|xs| xs.sum_dim(1), x, 2).unwrap_err();
        assert!(matches!(err, NumericError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_hessian_of_quadratic_form() {
        let device = Default::default();
        // f(x) = x0^2 + 3 x0 x1 + 2 x1^2, H = [[2, 3], [3, 4]].
        let x = Tensor::<Inner, 1>::from_data(TensorData::new(vec![0.3f32, -0.7], [2]), &device);
        let hess = hessian_matrix::<TestBackend, _>(
            |xs| {
                let x0 = xs.clone().slice([0..2 * 2, 0..1]);
                let x1 = xs.slice([0..2 * 2, 1..2]);
                let value = x0.clone().powf_scalar(2.0)
                    + (x0 * x1.clone()).mul_scalar(3.0)
                    + x1.powf_scalar(2.0).mul_scalar(2.0);
                value.squeeze::<1>(1)
            },
            x,
        )
        .unwrap();

        let values = to_vec(hess);
        for (got, want) in values.iter().zip([2.0f32, 3.0, 3.0, 4.0]) {
            assert!((got - want).abs() < 1e-2, "{values:?}");
        }
    }
}
