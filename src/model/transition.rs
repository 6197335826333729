use rand::Rng;

use super::norm_relu;
use crate::{
    init::LayerKind,
    layers::{AveragePooling2D, BatchNorm, Conv2D, Dropout, Layer, Mode},
    Error, Result, Tensor,
};

pub const TRANSITION_DROPOUT: f32 = 0.2;

/// Compresses channels and halves resolution between dense groups:
/// BN -> ReLU -> 1x1 conv -> dropout -> 2x2 average pool (stride 2).
#[derive(Debug)]
pub struct Transition {
    name: String,
    bn1: BatchNorm,
    conv1: Conv2D,
    dropout: Dropout,
    pool: AveragePooling2D,
}

impl Transition {
    pub fn new<R: Rng>(
        name: String,
        in_channels: usize,
        out_channels: usize,
        rng: &mut R,
    ) -> Result<Self> {
        Ok(Self {
            bn1: BatchNorm::spatial(format!("{}.bn1", name), in_channels),
            conv1: Conv2D::uniform(format!("{}.conv1", name), in_channels, out_channels, 1, 0, rng)?,
            dropout: Dropout::new(format!("{}.dropout", name), TRANSITION_DROPOUT, rng.gen())?,
            pool: AveragePooling2D::new(format!("{}.pool", name), (2, 2), None),
            name,
        })
    }

    /// `floor(channels * reduction)`.
    pub fn compressed_channels(channels: usize, reduction: f64) -> usize {
        (channels as f64 * reduction).floor() as usize
    }

    pub fn in_channels(&self) -> usize {
        self.conv1.in_channels()
    }

    pub fn out_channels(&self) -> usize {
        self.conv1.out_channels()
    }
}

impl Layer for Transition {
    fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor> {
        let out = self.conv1.forward(&norm_relu(&mut self.bn1, input, mode)?, mode)?;
        let out = self.dropout.forward(&out, mode)?;
        self.pool.forward(&out, mode)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        if input_shape.get(1) != Some(&self.in_channels()) {
            return Err(Error::ShapeMismatch {
                expected: vec![self.in_channels()],
                actual: input_shape.get(1).copied().into_iter().collect(),
            });
        }
        let shape = self.conv1.output_shape(input_shape)?;
        self.pool.output_shape(&shape)
    }

    fn num_parameters(&self) -> usize {
        self.bn1.num_parameters() + self.conv1.num_parameters()
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>)) {
        self.bn1.visit_mut(f);
        self.conv1.visit_mut(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_compressed_channels_floor() {
        assert_eq!(Transition::compressed_channels(168, 1.0), 168);
        assert_eq!(Transition::compressed_channels(168, 0.5), 84);
        assert_eq!(Transition::compressed_channels(25, 0.5), 12);
        assert_eq!(Transition::compressed_channels(10, 0.33), 3);
    }

    #[test]
    fn test_compressed_channels_non_dyadic_reduction() {
        assert_eq!(Transition::compressed_channels(120, 0.7), 84);
        assert_eq!(Transition::compressed_channels(10, 0.7), 7);
        assert_eq!(Transition::compressed_channels(180, 0.7), 125);
        assert_eq!(Transition::compressed_channels(100, 0.29), 28);
    }

    #[test]
    fn test_transition_halves_spatial_and_compresses() {
        let mut rng = StdRng::seed_from_u64(8);

        for &(channels, reduction, side) in &[(8, 0.5, 4), (6, 1.0, 8), (25, 0.5, 2), (10, 0.75, 6)] {
            let out_channels = Transition::compressed_channels(channels, reduction);
            let mut transition =
                Transition::new("trans".to_string(), channels, out_channels, &mut rng).unwrap();
            let input = Tensor::from_vec(
                (0..3 * channels * side * side).map(|v| (v % 7) as f32).collect(),
                &[3, channels, side, side],
            )
            .unwrap();

            let output = transition.forward(&input, Mode::Inference).unwrap();

            assert_eq!(output.shape(), &[3, out_channels, side / 2, side / 2]);
            assert_eq!(transition.output_shape(input.shape()).unwrap(), output.shape().to_vec());
        }
    }

    #[test]
    fn test_transition_odd_size_floors() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut transition = Transition::new("trans".to_string(), 4, 2, &mut rng).unwrap();

        let output = transition
            .forward(&Tensor::zeros(&[1, 4, 5, 7]), Mode::Training)
            .unwrap();

        assert_eq!(output.shape(), &[1, 2, 2, 3]);
    }
}
