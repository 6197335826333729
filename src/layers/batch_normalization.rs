use crate::{init::LayerKind, Error, Result, Tensor};
use ndarray::{Array1, Axis};

pub const DEFAULT_EPSILON: f32 = 1e-5;
pub const DEFAULT_MOMENTUM: f32 = 0.1;

/// Which input rank a normalization layer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormDims {
    /// `(N, C)` feature vectors.
    Flat,
    /// `(N, C, H, W)` feature maps.
    Spatial,
}

impl NormDims {
    fn rank(self) -> usize {
        match self {
            NormDims::Flat => 2,
            NormDims::Spatial => 4,
        }
    }
}

/// Batch normalization over axis 1.
///
/// Training mode normalizes with the (biased) batch statistics and folds the
/// unbiased batch variance into the running estimates; inference mode uses
/// the running estimates only.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    name: String,
    dims: NormDims,
    gamma: Array1<f32>,
    beta: Array1<f32>,
    running_mean: Array1<f32>,
    running_variance: Array1<f32>,
    epsilon: f32,
    momentum: f32,
}

impl BatchNorm {
    pub fn new(
        name: String,
        dims: NormDims,
        gamma: Array1<f32>,
        beta: Array1<f32>,
        running_mean: Array1<f32>,
        running_variance: Array1<f32>,
        epsilon: f32,
    ) -> Result<Self> {
        let num_features = gamma.len();

        for (label, len) in [
            ("beta", beta.len()),
            ("running_mean", running_mean.len()),
            ("running_variance", running_variance.len()),
        ] {
            if len != num_features {
                return Err(Error::Layer(format!(
                    "BatchNorm: {} length {} doesn't match gamma length {}",
                    label, len, num_features
                )));
            }
        }

        Ok(Self {
            name,
            dims,
            gamma,
            beta,
            running_mean,
            running_variance,
            epsilon,
            momentum: DEFAULT_MOMENTUM,
        })
    }

    fn with_defaults(name: String, dims: NormDims, num_features: usize) -> Self {
        Self {
            name,
            dims,
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            running_mean: Array1::zeros(num_features),
            running_variance: Array1::ones(num_features),
            epsilon: DEFAULT_EPSILON,
            momentum: DEFAULT_MOMENTUM,
        }
    }

    pub fn spatial(name: String, num_features: usize) -> Self {
        Self::with_defaults(name, NormDims::Spatial, num_features)
    }

    pub fn flat(name: String, num_features: usize) -> Self {
        Self::with_defaults(name, NormDims::Flat, num_features)
    }

    pub fn dims(&self) -> NormDims {
        self.dims
    }

    pub fn num_features(&self) -> usize {
        self.gamma.len()
    }

    pub fn gamma(&self) -> &Array1<f32> {
        &self.gamma
    }

    pub fn gamma_mut(&mut self) -> &mut Array1<f32> {
        &mut self.gamma
    }

    pub fn beta(&self) -> &Array1<f32> {
        &self.beta
    }

    pub fn beta_mut(&mut self) -> &mut Array1<f32> {
        &mut self.beta
    }

    pub fn running_mean(&self) -> &Array1<f32> {
        &self.running_mean
    }

    pub fn running_variance(&self) -> &Array1<f32> {
        &self.running_variance
    }
}

impl super::Layer for BatchNorm {
    fn forward(&mut self, input: &Tensor, mode: super::Mode) -> Result<Tensor> {
        let input_shape = input.shape();

        if input_shape.len() != self.dims.rank() {
            return Err(Error::Layer(format!(
                "{}: expected {}D input, got {:?}",
                self.name,
                self.dims.rank(),
                input_shape
            )));
        }

        let num_features = input_shape[1];
        if num_features != self.num_features() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.num_features()],
                actual: vec![num_features],
            });
        }

        let mut output = input.data().to_owned();

        for feature_idx in 0..num_features {
            let mut lane = output.index_axis_mut(Axis(1), feature_idx);

            let (mean, variance) = if mode.is_training() {
                let count = lane.len();
                if count < 2 {
                    return Err(Error::Layer(format!(
                        "{}: expected more than 1 value per channel when training, got input {:?}",
                        self.name, input_shape
                    )));
                }

                let mean = lane.sum() / count as f32;
                let biased = lane.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / count as f32;
                let unbiased = biased * count as f32 / (count - 1) as f32;

                let m = self.momentum;
                self.running_mean[feature_idx] = (1.0 - m) * self.running_mean[feature_idx] + m * mean;
                self.running_variance[feature_idx] =
                    (1.0 - m) * self.running_variance[feature_idx] + m * unbiased;

                (mean, biased)
            } else {
                (self.running_mean[feature_idx], self.running_variance[feature_idx])
            };

            let gamma = self.gamma[feature_idx];
            let beta = self.beta[feature_idx];
            let std_inv = 1.0 / (variance + self.epsilon).sqrt();
            lane.mapv_inplace(|x| gamma * ((x - mean) * std_inv) + beta);
        }

        Ok(Tensor::new(output))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(input_shape.to_vec())
    }

    fn num_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>)) {
        f(LayerKind::Normalization(self));
    }
}
