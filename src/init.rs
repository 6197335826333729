//! Post-construction parameter initialization.
//!
//! Every model exposes its primitives through `visit_mut` as a [`LayerKind`];
//! [`initialize`] dispatches each kind to its own initializer.

use ndarray::{Array1, Array4};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;

use crate::layers::{BatchNorm, Conv2D, Dense, NormDims};
use crate::{Error, Result};

const AFFINE_STD: f32 = 1e-3;

/// Initializable primitive, borrowed mutably from its owner.
#[derive(Debug)]
pub enum LayerKind<'a> {
    Convolution(&'a mut Conv2D),
    Normalization(&'a mut BatchNorm),
    LinearProjection(&'a mut Dense),
}

/// Anything that can hand out its primitives for initialization.
pub trait Visit {
    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>));
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitReport {
    pub convolutions: usize,
    pub normalizations: usize,
    pub projections: usize,
}

/// Convolution weights ~ N(0, sqrt(2 / (kh * kw * out_channels))).
pub fn init_convolution<R: Rng>(conv: &mut Conv2D, rng: &mut R) -> Result<()> {
    let (kernel_h, kernel_w) = conv.kernel_size();
    let fan_out = kernel_h * kernel_w * conv.out_channels();
    let std = (2.0 / fan_out as f32).sqrt();

    let dim = conv.weights().dim();
    *conv.weights_mut() = Array4::random_using(dim, normal(0.0, std)?, rng);
    Ok(())
}

/// Spatial normalization: scale ~ N(1, 1e-3), shift ~ N(0, 1e-3).
/// Flat (1-D) normalization keeps its defaults.
pub fn init_normalization<R: Rng>(norm: &mut BatchNorm, rng: &mut R) -> Result<bool> {
    if norm.dims() != NormDims::Spatial {
        return Ok(false);
    }

    let n = norm.num_features();
    *norm.gamma_mut() = Array1::random_using(n, normal(1.0, AFFINE_STD)?, rng);
    *norm.beta_mut() = Array1::random_using(n, normal(0.0, AFFINE_STD)?, rng);
    Ok(true)
}

/// Projection bias ~ N(0, 1e-3); weights are left as constructed.
pub fn init_projection<R: Rng>(dense: &mut Dense, rng: &mut R) -> Result<()> {
    if let Some(bias) = dense.bias_mut() {
        let n = bias.len();
        *bias = Array1::random_using(n, normal(0.0, AFFINE_STD)?, rng);
    }
    Ok(())
}

pub fn initialize<M: Visit + ?Sized, R: Rng>(model: &mut M, rng: &mut R) -> Result<InitReport> {
    let mut report = InitReport::default();
    let mut failure = None;

    model.visit_mut(&mut |kind| {
        if failure.is_some() {
            return;
        }
        let outcome = match kind {
            LayerKind::Convolution(conv) => init_convolution(conv, rng).map(|_| {
                report.convolutions += 1;
            }),
            LayerKind::Normalization(norm) => init_normalization(norm, rng).map(|touched| {
                if touched {
                    report.normalizations += 1;
                }
            }),
            LayerKind::LinearProjection(dense) => init_projection(dense, rng).map(|_| {
                report.projections += 1;
            }),
        };
        if let Err(e) = outcome {
            failure = Some(e);
        }
    });

    if let Some(e) = failure {
        return Err(e);
    }

    log::debug!(
        "initialized {} convolutions, {} normalizations, {} projections",
        report.convolutions,
        report.normalizations,
        report.projections
    );
    Ok(report)
}

fn normal(mean: f32, std: f32) -> Result<Normal<f32>> {
    Normal::new(mean, std)
        .map_err(|e| Error::Layer(format!("Invalid normal distribution N({}, {}): {}", mean, std, e)))
}
