use crate::{init::LayerKind, Error, Result, Tensor};
use ndarray::{Array1, Array2, IxDyn};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

/// Linear projection `y = x W + b` over the last axis of the input.
#[derive(Debug, Clone)]
pub struct Dense {
    name: String,
    /// `(in_features, units)`
    weights: Array2<f32>,
    bias: Option<Array1<f32>>,
}

impl Dense {
    pub fn new(name: String, weights: Array2<f32>, bias: Option<Array1<f32>>) -> Result<Self> {
        let units = weights.ncols();

        if let Some(ref b) = bias {
            if b.len() != units {
                return Err(Error::Layer(format!(
                    "Bias size {} doesn't match units {}",
                    b.len(),
                    units
                )));
            }
        }

        Ok(Self {
            name,
            weights,
            bias,
        })
    }

    /// Weights and bias drawn from U(-1/sqrt(in), 1/sqrt(in)).
    pub fn uniform<R: Rng>(
        name: String,
        in_features: usize,
        units: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if in_features == 0 || units == 0 {
            return Err(Error::Layer(format!(
                "{}: cannot build a {} -> {} projection",
                name, in_features, units
            )));
        }

        let bound = 1.0 / (in_features as f32).sqrt();
        let weights = Array2::random_using((in_features, units), Uniform::new(-bound, bound), rng);
        let bias = Array1::random_using(units, Uniform::new(-bound, bound), rng);

        Self::new(name, weights, Some(bias))
    }

    pub fn in_features(&self) -> usize {
        self.weights.nrows()
    }

    pub fn units(&self) -> usize {
        self.weights.ncols()
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }

    pub fn bias_mut(&mut self) -> Option<&mut Array1<f32>> {
        self.bias.as_mut()
    }
}

impl super::Layer for Dense {
    fn forward(&mut self, input: &Tensor, _mode: super::Mode) -> Result<Tensor> {
        let input_shape = input.shape();

        let features = *input_shape.last().ok_or_else(|| {
            Error::Layer(format!("{}: scalar input cannot be projected", self.name))
        })?;

        if features != self.in_features() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.in_features()],
                actual: vec![features],
            });
        }

        let rows = input.len() / features.max(1);
        let input_2d = input
            .data()
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((rows, features))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        let mut output = input_2d.dot(&self.weights);

        if let Some(ref bias) = self.bias {
            output += bias;
        }

        let mut output_shape = input_shape.to_vec();
        if let Some(last) = output_shape.last_mut() {
            *last = self.units();
        }

        let output_dyn = output
            .into_shape_with_order(IxDyn(&output_shape))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        Ok(Tensor::new(output_dyn))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape.split_last() {
            Some((_, rest)) => {
                let mut shape = rest.to_vec();
                shape.push(self.units());
                Ok(shape)
            }
            None => Err(Error::Layer(format!(
                "{}: scalar input cannot be projected",
                self.name
            ))),
        }
    }

    fn num_parameters(&self) -> usize {
        self.weights.len() + self.bias.as_ref().map_or(0, |b| b.len())
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>)) {
        f(LayerKind::LinearProjection(self));
    }
}
