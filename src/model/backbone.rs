use rand::Rng;

use super::{norm_relu, DenseNetConfig, DenseUnit, Sequential, Transition};
use crate::{
    init::{LayerKind, Visit},
    layers::{AveragePooling2D, BatchNorm, Conv2D, Layer, Mode},
    Result, Tensor,
};

/// Channel count after each stage of the backbone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageChannels {
    pub stem: usize,
    pub dense1: usize,
    pub trans1: usize,
    pub dense2: usize,
    pub trans2: usize,
    pub dense3: usize,
}

impl StageChannels {
    pub fn for_config(config: &DenseNetConfig) -> Self {
        let added = config.n_dense_blocks() * config.growth_rate;
        let stem = 2 * config.growth_rate;
        let dense1 = stem + added;
        let trans1 = Transition::compressed_channels(dense1, config.reduction);
        let dense2 = trans1 + added;
        let trans2 = Transition::compressed_channels(dense2, config.reduction);
        let dense3 = trans2 + added;

        Self {
            stem,
            dense1,
            trans1,
            dense2,
            trans2,
            dense3,
        }
    }
}

/// Convolutional feature extractor: stem conv, three dense groups separated
/// by two transitions, then BN -> ReLU -> global average pool.
#[derive(Debug)]
pub struct DenseNetBackbone {
    conv1: Conv2D,
    dense1: Sequential,
    trans1: Transition,
    dense2: Sequential,
    trans2: Transition,
    dense3: Sequential,
    bn1: BatchNorm,
    pool: AveragePooling2D,
    channels: StageChannels,
}

impl DenseNetBackbone {
    pub fn new<R: Rng>(config: &DenseNetConfig, rng: &mut R) -> Result<Self> {
        let channels = StageChannels::for_config(config);
        let n_blocks = config.n_dense_blocks();
        let growth = config.growth_rate;
        let bottleneck = config.bottleneck;
        let window = config.final_pool_window();

        log::debug!(
            "backbone: {} {} units per group, growth {}, stages {:?}",
            n_blocks,
            if bottleneck { "bottleneck" } else { "single-layer" },
            growth,
            channels
        );

        Ok(Self {
            conv1: Conv2D::uniform("conv1".to_string(), 3, channels.stem, 3, 1, rng)?,
            dense1: make_dense("dense1", channels.stem, growth, n_blocks, bottleneck, rng)?,
            trans1: Transition::new("trans1".to_string(), channels.dense1, channels.trans1, rng)?,
            dense2: make_dense("dense2", channels.trans1, growth, n_blocks, bottleneck, rng)?,
            trans2: Transition::new("trans2".to_string(), channels.dense2, channels.trans2, rng)?,
            dense3: make_dense("dense3", channels.trans2, growth, n_blocks, bottleneck, rng)?,
            bn1: BatchNorm::spatial("bn1".to_string(), channels.dense3),
            pool: AveragePooling2D::new("pool".to_string(), (window, window), None),
            channels,
        })
    }

    pub fn out_channels(&self) -> usize {
        self.channels.dense3
    }

    pub fn stage_channels(&self) -> StageChannels {
        self.channels
    }

    pub fn dense_groups(&self) -> [&Sequential; 3] {
        [&self.dense1, &self.dense2, &self.dense3]
    }

    /// `(N, 3, H, W) -> (N, C_out, H / 4 / window, W / 4 / window)`.
    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor> {
        let out = self.conv1.forward(input, mode)?;
        let out = self.trans1.forward(&self.dense1.forward(&out, mode)?, mode)?;
        let out = self.trans2.forward(&self.dense2.forward(&out, mode)?, mode)?;
        let out = self.dense3.forward(&out, mode)?;
        self.pool.forward(&norm_relu(&mut self.bn1, &out, mode)?, mode)
    }

    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        let stages: [&dyn Layer; 7] = [
            &self.conv1,
            &self.dense1,
            &self.trans1,
            &self.dense2,
            &self.trans2,
            &self.dense3,
            &self.pool,
        ];
        stages
            .iter()
            .try_fold(input_shape.to_vec(), |shape, stage| stage.output_shape(&shape))
    }

    pub fn num_parameters(&self) -> usize {
        self.conv1.num_parameters()
            + self.dense1.num_parameters()
            + self.trans1.num_parameters()
            + self.dense2.num_parameters()
            + self.trans2.num_parameters()
            + self.dense3.num_parameters()
            + self.bn1.num_parameters()
    }

    pub fn summary(&self, input_shape: &[usize]) -> Result<String> {
        let mut s = String::new();
        let mut shape = input_shape.to_vec();

        let stages: [&dyn Layer; 6] = [
            &self.conv1,
            &self.dense1,
            &self.trans1,
            &self.dense2,
            &self.trans2,
            &self.dense3,
        ];
        for stage in stages {
            shape = stage.output_shape(&shape)?;
            s.push_str(&format!(
                "{:28} {:24} {:>10}\n",
                stage.name(),
                format!("{:?}", shape),
                stage.num_parameters()
            ));
        }

        shape = self.pool.output_shape(&shape)?;
        s.push_str(&format!(
            "{:28} {:24} {:>10}\n",
            "bn1 + pool",
            format!("{:?}", shape),
            self.bn1.num_parameters()
        ));
        Ok(s)
    }
}

impl Visit for DenseNetBackbone {
    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>)) {
        self.conv1.visit_mut(f);
        self.dense1.visit_mut(f);
        self.trans1.visit_mut(f);
        self.dense2.visit_mut(f);
        self.trans2.visit_mut(f);
        self.dense3.visit_mut(f);
        self.bn1.visit_mut(f);
    }
}

fn make_dense<R: Rng>(
    name: &str,
    in_channels: usize,
    growth_rate: usize,
    n_blocks: usize,
    bottleneck: bool,
    rng: &mut R,
) -> Result<Sequential> {
    let mut group = Sequential::new(name.to_string());
    let mut channels = in_channels;

    for i in 0..n_blocks {
        let unit = DenseUnit::new(format!("{}.{}", name, i), channels, growth_rate, bottleneck, rng)?;
        group.add(Box::new(unit));
        channels += growth_rate;
    }

    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_stage_channels_reference_config() {
        let config = DenseNetConfig::new(12, 40, 1.0, 10, false);

        assert_eq!(
            StageChannels::for_config(&config),
            StageChannels {
                stem: 24,
                dense1: 168,
                trans1: 168,
                dense2: 312,
                trans2: 312,
                dense3: 456,
            }
        );
    }

    #[test]
    fn test_stage_channels_with_compression() {
        let config = DenseNetConfig::new(12, 100, 0.5, 10, true);
        let channels = StageChannels::for_config(&config);

        // 16 units per group add 192 channels
        assert_eq!(channels.dense1, 216);
        assert_eq!(channels.trans1, 108);
        assert_eq!(channels.dense2, 300);
        assert_eq!(channels.trans2, 150);
        assert_eq!(channels.dense3, 342);
    }

    #[test]
    fn test_stage_channels_non_dyadic_reduction() {
        let config = DenseNetConfig::new(12, 28, 0.7, 10, false);

        // 120 * 0.7 floors to 84, 180 * 0.7 to 125, as in double precision
        assert_eq!(
            StageChannels::for_config(&config),
            StageChannels {
                stem: 24,
                dense1: 120,
                trans1: 84,
                dense2: 180,
                trans2: 125,
                dense3: 221,
            }
        );
    }

    #[test]
    fn test_backbone_pools_to_single_position() {
        let config = DenseNetConfig::new(2, 10, 0.5, 3, false).with_input_size(16);
        let mut rng = StdRng::seed_from_u64(10);
        let mut backbone = DenseNetBackbone::new(&config, &mut rng).unwrap();

        let input = Tensor::from_vec(
            (0..2 * 3 * 16 * 16).map(|v| (v % 11) as f32 / 11.0).collect(),
            &[2, 3, 16, 16],
        )
        .unwrap();
        let output = backbone.forward(&input, Mode::Inference).unwrap();

        assert_eq!(output.shape(), &[2, backbone.out_channels(), 1, 1]);
        assert_eq!(backbone.output_shape(input.shape()).unwrap(), output.shape().to_vec());
        assert!(backbone.dense_groups().iter().all(|g| g.num_layers() == 2));

        let summary = backbone.summary(input.shape()).unwrap();
        assert!(summary.contains("[2, 8, 16, 16]"));
        assert!(summary.contains("[2, 8, 1, 1]"));
        assert!(backbone.summary(&[2, 5, 16, 16]).is_err());
        assert!(backbone.summary(&[2, 3, 2, 2]).is_err());
    }
}
