use rand::Rng;

use super::norm_relu;
use crate::{
    init::LayerKind,
    layers::{BatchNorm, Conv2D, Layer, Mode},
    Error, Result, Tensor,
};

/// Channel width of the bottleneck's 1x1 stage, as a multiple of the growth rate.
pub const BOTTLENECK_WIDTH: usize = 4;

/// BN -> ReLU -> 1x1 conv (4g) -> BN -> ReLU -> 3x3 conv (g).
#[derive(Debug)]
pub struct Bottleneck {
    bn1: BatchNorm,
    conv1: Conv2D,
    bn2: BatchNorm,
    conv2: Conv2D,
}

/// BN -> ReLU -> 3x3 conv (g).
#[derive(Debug)]
pub struct SingleLayer {
    bn1: BatchNorm,
    conv1: Conv2D,
}

/// One densely connected unit: its `growth_rate` new feature maps are
/// concatenated onto its input, so `(N, C, H, W) -> (N, C + g, H, W)`.
#[derive(Debug)]
pub enum DenseUnit {
    Bottleneck { name: String, unit: Bottleneck },
    SingleLayer { name: String, unit: SingleLayer },
}

impl DenseUnit {
    pub fn new<R: Rng>(
        name: String,
        in_channels: usize,
        growth_rate: usize,
        bottleneck: bool,
        rng: &mut R,
    ) -> Result<Self> {
        if bottleneck {
            let inter_channels = BOTTLENECK_WIDTH * growth_rate;
            let unit = Bottleneck {
                bn1: BatchNorm::spatial(format!("{}.bn1", name), in_channels),
                conv1: Conv2D::uniform(format!("{}.conv1", name), in_channels, inter_channels, 1, 0, rng)?,
                bn2: BatchNorm::spatial(format!("{}.bn2", name), inter_channels),
                conv2: Conv2D::uniform(format!("{}.conv2", name), inter_channels, growth_rate, 3, 1, rng)?,
            };
            Ok(DenseUnit::Bottleneck { name, unit })
        } else {
            let unit = SingleLayer {
                bn1: BatchNorm::spatial(format!("{}.bn1", name), in_channels),
                conv1: Conv2D::uniform(format!("{}.conv1", name), in_channels, growth_rate, 3, 1, rng)?,
            };
            Ok(DenseUnit::SingleLayer { name, unit })
        }
    }

    pub fn growth_rate(&self) -> usize {
        match self {
            DenseUnit::Bottleneck { unit, .. } => unit.conv2.out_channels(),
            DenseUnit::SingleLayer { unit, .. } => unit.conv1.out_channels(),
        }
    }

    pub fn in_channels(&self) -> usize {
        match self {
            DenseUnit::Bottleneck { unit, .. } => unit.bn1.num_features(),
            DenseUnit::SingleLayer { unit, .. } => unit.bn1.num_features(),
        }
    }

    pub fn is_bottleneck(&self) -> bool {
        matches!(self, DenseUnit::Bottleneck { .. })
    }
}

impl Layer for DenseUnit {
    fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor> {
        let delta = match self {
            DenseUnit::Bottleneck { unit, .. } => {
                let out = unit.conv1.forward(&norm_relu(&mut unit.bn1, input, mode)?, mode)?;
                unit.conv2.forward(&norm_relu(&mut unit.bn2, &out, mode)?, mode)?
            }
            DenseUnit::SingleLayer { unit, .. } => {
                unit.conv1.forward(&norm_relu(&mut unit.bn1, input, mode)?, mode)?
            }
        };

        Tensor::concat(&[input, &delta], 1)
    }

    fn name(&self) -> &str {
        match self {
            DenseUnit::Bottleneck { name, .. } | DenseUnit::SingleLayer { name, .. } => name,
        }
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match *input_shape {
            [n, c, h, w] if c == self.in_channels() => Ok(vec![n, c + self.growth_rate(), h, w]),
            [_, c, _, _] => Err(Error::ShapeMismatch {
                expected: vec![self.in_channels()],
                actual: vec![c],
            }),
            _ => Err(Error::Layer(format!(
                "{} expects 4D (N, C, H, W) input, got {:?}",
                self.name(),
                input_shape
            ))),
        }
    }

    fn num_parameters(&self) -> usize {
        match self {
            DenseUnit::Bottleneck { unit, .. } => {
                unit.bn1.num_parameters()
                    + unit.conv1.num_parameters()
                    + unit.bn2.num_parameters()
                    + unit.conv2.num_parameters()
            }
            DenseUnit::SingleLayer { unit, .. } => {
                unit.bn1.num_parameters() + unit.conv1.num_parameters()
            }
        }
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>)) {
        match self {
            DenseUnit::Bottleneck { unit, .. } => {
                unit.bn1.visit_mut(f);
                unit.conv1.visit_mut(f);
                unit.bn2.visit_mut(f);
                unit.conv2.visit_mut(f);
            }
            DenseUnit::SingleLayer { unit, .. } => {
                unit.bn1.visit_mut(f);
                unit.conv1.visit_mut(f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_units_add_growth_rate_channels() {
        let mut rng = StdRng::seed_from_u64(5);

        for &bottleneck in &[false, true] {
            for &(channels, growth, side) in &[(1, 1, 1), (3, 4, 5), (8, 6, 4), (24, 12, 2)] {
                let mut unit =
                    DenseUnit::new("unit".to_string(), channels, growth, bottleneck, &mut rng)
                        .unwrap();
                let input = Tensor::from_vec(
                    (0..2 * channels * side * side).map(|v| v as f32 * 0.01).collect(),
                    &[2, channels, side, side],
                )
                .unwrap();

                let output = unit.forward(&input, Mode::Inference).unwrap();

                assert_eq!(output.shape(), &[2, channels + growth, side, side]);
                assert_eq!(
                    unit.output_shape(input.shape()).unwrap(),
                    output.shape().to_vec()
                );
            }
        }
    }

    #[test]
    fn test_unit_preserves_input_channels() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut unit = DenseUnit::new("unit".to_string(), 2, 3, false, &mut rng).unwrap();
        let input = Tensor::from_vec((0..8).map(|v| v as f32).collect(), &[1, 2, 2, 2]).unwrap();

        let output = unit.forward(&input, Mode::Inference).unwrap();

        assert_eq!(&output.to_vec()[..8], input.to_vec().as_slice());
    }

    #[test]
    fn test_bottleneck_parameter_count() {
        let mut rng = StdRng::seed_from_u64(7);
        let unit = DenseUnit::new("unit".to_string(), 16, 12, true, &mut rng).unwrap();

        let expected = 2 * 16 + 16 * 48 + 2 * 48 + 48 * 12 * 9;
        assert!(unit.is_bottleneck());
        assert_eq!(unit.num_parameters(), expected);
    }
}
