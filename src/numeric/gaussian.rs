use std::f64::consts::PI;

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::NumericError;

/// A multivariate normal fitted to the latents of one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassGaussian {
    mean: Vec<f64>,
    covariance: Vec<f64>,
    cholesky: Vec<f64>,
    log_det: f64,
}

impl ClassGaussian {
    /// `covariance` is row-major `d x d` and must be positive definite.
    pub fn new(mean: Vec<f64>, covariance: Vec<f64>) -> Result<Self, NumericError> {
        let d = mean.len();
        if covariance.len() != d * d {
            return Err(NumericError::ShapeMismatch {
                expected: vec![d, d],
                found: vec![covariance.len()],
            });
        }
        let cholesky = cholesky(&covariance, d).ok_or(NumericError::NotPositiveDefinite)?;
        let log_det = 2.0 * (0..d).map(|i| cholesky[i * d + i].ln()).sum::<f64>();
        Ok(ClassGaussian {
            mean,
            covariance,
            cholesky,
            log_det,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn covariance(&self) -> &[f64] {
        &self.covariance
    }

    /// Log density at `x`; `x` must have [`ClassGaussian::dim`] entries.
    pub fn log_prob(&self, x: &[f64]) -> f64 {
        let d = self.dim();
        // Solve L y = x - mean.
        let mut y = vec![0.0; d];
        for i in 0..d {
            let mut acc = x[i] - self.mean[i];
            for k in 0..i {
                acc -= self.cholesky[i * d + k] * y[k];
            }
            y[i] = acc / self.cholesky[i * d + i];
        }
        let mahalanobis: f64 = y.iter().map(|v| v * v).sum();
        -0.5 * (d as f64 * (2.0 * PI).ln() + self.log_det + mahalanobis)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let d = self.dim();
        let eps: Vec<f64> = (0..d).map(|_| StandardNormal.sample(rng)).collect();
        (0..d)
            .map(|i| {
                self.mean[i]
                    + (0..=i)
                        .map(|k| self.cholesky[i * d + k] * eps[k])
                        .sum::<f64>()
            })
            .collect()
    }
}

fn cholesky(matrix: &[f64], d: usize) -> Option<Vec<f64>> {
    let mut lower = vec![0.0; d * d];
    for i in 0..d {
        for j in 0..=i {
            let mut sum = matrix[i * d + j];
            for k in 0..j {
                sum -= lower[i * d + k] * lower[j * d + k];
            }
            if i == j {
                if !(sum > 1e-12 * matrix[i * d + i].abs()) {
                    return None;
                }
                lower[i * d + i] = sum.sqrt();
            } else {
                lower[i * d + j] = sum / lower[j * d + j];
            }
        }
    }
    Some(lower)
}

fn host_floats<B: Backend, const D: usize>(t: Tensor<B, D>) -> Result<Vec<f64>, NumericError> {
    t.into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| NumericError::TensorData(format!("{e:?}")))
}

fn host_labels<B: Backend>(t: Tensor<B, 1, Int>) -> Result<Vec<i64>, NumericError> {
    t.into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| NumericError::TensorData(format!("{e:?}")))
}

/// Fit one Gaussian per class to the rows of `z` (`[n, d]`) labelled by `y`.
///
/// Covariances are biased (divided by the class count). Labels outside
/// `0..class_num` are ignored.
pub fn analyze_latent_space<B: Backend>(
    z: Tensor<B, 2>,
    y: Tensor<B, 1, Int>,
    class_num: usize,
) -> Result<Vec<ClassGaussian>, NumericError> {
    let [n, d] = z.dims();
    let [m] = y.dims();
    if d == 0 {
        return Err(NumericError::ShapeMismatch {
            expected: vec![n, 1],
            found: vec![n, 0],
        });
    }
    if m != n {
        return Err(NumericError::ShapeMismatch {
            expected: vec![n],
            found: vec![m],
        });
    }
    let device = z.device();
    let labels = host_labels(y)?;

    let mut gaussians = Vec::with_capacity(class_num);
    for class in 0..class_num {
        let members: Vec<i64> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == class as i64)
            .map(|(row, _)| row as i64)
            .collect();
        if members.is_empty() {
            return Err(NumericError::EmptyClass(class));
        }
        let count = members.len();
        let index = Tensor::<B, 1, Int>::from_data(TensorData::new(members, [count]), &device);

        let rows = z.clone().select(0, index);
        let mean = rows.clone().mean_dim(0);
        let centered = rows - mean.clone();
        let covariance = centered
            .clone()
            .transpose()
            .matmul(centered)
            .div_scalar(count as f64);

        let mean = host_floats(mean)?;
        let covariance = host_floats(covariance)?;
        let gaussian = ClassGaussian::new(mean, covariance).map_err(|e| match e {
            NumericError::NotPositiveDefinite => NumericError::SingularCovariance(class),
            other => other,
        })?;
        gaussians.push(gaussian);
    }
    Ok(gaussians)
}

/// Log density of each row of `z` under the Gaussian of its label; `[n, 1]`.
pub fn log_pz<B: Backend>(
    z: Tensor<B, 2>,
    y: Tensor<B, 1, Int>,
    gaussians: &[ClassGaussian],
) -> Result<Tensor<B, 2>, NumericError> {
    let device = z.device();
    let [n, d] = z.dims();
    let [m] = y.dims();
    if d == 0 {
        return Err(NumericError::ShapeMismatch {
            expected: vec![n, 1],
            found: vec![n, 0],
        });
    }
    if m != n {
        return Err(NumericError::ShapeMismatch {
            expected: vec![n],
            found: vec![m],
        });
    }
    let values = host_floats(z)?;
    let labels = host_labels(y)?;

    let mut densities = Vec::with_capacity(n);
    for (label, row) in labels.iter().zip(values.chunks(d)) {
        let gaussian = usize::try_from(*label)
            .ok()
            .and_then(|class| gaussians.get(class))
            .ok_or(NumericError::LabelOutOfRange {
                label: *label,
                n_labels: gaussians.len(),
            })?;
        if gaussian.dim() != d {
            return Err(NumericError::ShapeMismatch {
                expected: vec![gaussian.dim()],
                found: vec![d],
            });
        }
        densities.push(gaussian.log_prob(row) as f32);
    }
    Ok(Tensor::from_data(TensorData::new(densities, [n, 1]), &device))
}

/// Draw `n` latents from a uniformly chosen class each and decode them.
pub fn sample<B, const D: usize, F, R>(
    n: usize,
    decoder: F,
    gaussians: &[ClassGaussian],
    rng: &mut R,
    device: &B::Device,
) -> Result<Tensor<B, D>, NumericError>
where
    B: Backend,
    F: FnOnce(Tensor<B, 2>) -> Tensor<B, D>,
    R: Rng + ?Sized,
{
    let first = gaussians.first().ok_or(NumericError::NoGaussians)?;
    let d = first.dim();
    if let Some(other) = gaussians.iter().find(|g| g.dim() != d) {
        return Err(NumericError::ShapeMismatch {
            expected: vec![d],
            found: vec![other.dim()],
        });
    }

    let mut latents = Vec::with_capacity(n * d);
    for _ in 0..n {
        let class = rng.random_range(0..gaussians.len());
        latents.extend(gaussians[class].sample(rng).into_iter().map(|v| v as f32));
    }
    let z = Tensor::<B, 2>::from_data(TensorData::new(latents, [n, d]), device);
    Ok(decoder(z))
}
