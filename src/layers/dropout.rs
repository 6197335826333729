use crate::{Error, Result, Tensor};
use ndarray::Zip;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Inverted dropout: zeroes elements with probability `rate` during training
/// and rescales survivors by `1 / (1 - rate)`. Identity during inference.
#[derive(Debug, Clone)]
pub struct Dropout {
    name: String,
    rate: f32,
    rng: StdRng,
}

impl Dropout {
    pub fn new(name: String, rate: f32, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(Error::Layer(format!(
                "{}: dropout rate must be in [0, 1), got {}",
                name, rate
            )));
        }

        Ok(Self {
            name,
            rate,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Applies the mask to an arbitrary array in place.
    pub(crate) fn apply_inplace<D: ndarray::Dimension>(
        &mut self,
        data: &mut ndarray::Array<f32, D>,
        mode: super::Mode,
    ) {
        if !mode.is_training() || self.rate == 0.0 {
            return;
        }

        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let rng = &mut self.rng;
        Zip::from(data).for_each(|x| {
            *x = if rng.gen::<f32>() < keep { *x * scale } else { 0.0 };
        });
    }
}

impl super::Layer for Dropout {
    fn forward(&mut self, input: &Tensor, mode: super::Mode) -> Result<Tensor> {
        let mut output = input.clone();
        self.apply_inplace(output.data_mut(), mode);
        Ok(output)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(input_shape.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Layer, Mode};

    #[test]
    fn test_dropout_identity_in_inference() {
        let mut layer = Dropout::new("drop".to_string(), 0.5, 1).unwrap();
        let input = Tensor::from_vec((0..16).map(|i| i as f32).collect(), &[4, 4]).unwrap();

        let output = layer.forward(&input, Mode::Inference).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_dropout_training_masks_and_scales() {
        let mut layer = Dropout::new("drop".to_string(), 0.2, 42).unwrap();
        let input = Tensor::from_vec(vec![1.0; 10_000], &[100, 100]).unwrap();

        let output = layer.forward(&input, Mode::Training).unwrap().to_vec();

        assert!(output.iter().all(|&x| x == 0.0 || (x - 1.25).abs() < 1e-6));
        let dropped = output.iter().filter(|&&x| x == 0.0).count() as f32 / 10_000.0;
        assert!((dropped - 0.2).abs() < 0.03, "dropped fraction {}", dropped);
    }

    #[test]
    fn test_dropout_rate_validated() {
        assert!(Dropout::new("drop".to_string(), 1.0, 0).is_err());
        assert!(Dropout::new("drop".to_string(), -0.1, 0).is_err());
        assert!(Dropout::new("drop".to_string(), 0.0, 0).is_ok());
    }
}
