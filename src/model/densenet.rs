use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{DenseNetBackbone, DenseNetConfig, TemporalHead};
use crate::{
    init::{self, InitReport, LayerKind, Visit},
    layers::Mode,
    Error, Result, Tensor,
};

/// DenseNet feature extractor followed by the recurrent head.
///
/// `forward` maps `(N, 3, S, S)` images and a `(layers, N, 1)` hidden seed to
/// `(N, n_classes)` log-probabilities.
#[derive(Debug)]
pub struct DenseNet {
    config: DenseNetConfig,
    backbone: DenseNetBackbone,
    head: TemporalHead,
    init_report: InitReport,
}

impl DenseNet {
    pub fn new(config: DenseNetConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let backbone = DenseNetBackbone::new(&config, &mut rng)?;
        let head = TemporalHead::new(&config.head, backbone.out_channels(), config.n_classes, &mut rng)?;

        let mut model = Self {
            config,
            backbone,
            head,
            init_report: InitReport::default(),
        };
        model.init_report = init::initialize(&mut model, &mut rng)?;

        log::info!(
            "built DenseNet-{} (growth {}, {} classes): {} parameters",
            model.config.depth,
            model.config.growth_rate,
            model.config.n_classes,
            model.num_parameters()
        );

        Ok(model)
    }

    /// Zero hidden seed of shape `(num_layers, batch_size, 1)`.
    pub fn init_hidden_starter(&self, batch_size: usize) -> Tensor {
        Tensor::zeros(&[self.config.head.num_layers, batch_size, 1])
    }

    pub fn forward(&mut self, input: &Tensor, seed: &Tensor, mode: Mode) -> Result<Tensor> {
        let side = self.config.input_size;
        match *input.shape() {
            [_, 3, h, w] if h == side && w == side => {}
            [n, ..] => {
                return Err(Error::ShapeMismatch {
                    expected: vec![n, 3, side, side],
                    actual: input.shape().to_vec(),
                })
            }
            [] => {
                return Err(Error::Layer("DenseNet input must be (N, 3, H, W)".to_string()));
            }
        }

        let features = self.backbone.forward(input, mode)?;
        log::trace!("backbone features {:?}", features.shape());

        let output = self.head.forward(&features, seed, mode)?;
        log::trace!("head output {:?}", output.shape());
        Ok(output)
    }

    /// Inference-mode forward with a zero hidden seed.
    pub fn predict(&mut self, input: &Tensor) -> Result<Tensor> {
        let batch_size = input.shape().first().copied().unwrap_or(0);
        let seed = self.init_hidden_starter(batch_size);
        self.forward(input, &seed, Mode::Inference)
    }

    pub fn num_parameters(&self) -> usize {
        self.backbone.num_parameters() + self.head.num_parameters()
    }

    pub fn config(&self) -> &DenseNetConfig {
        &self.config
    }

    pub fn backbone(&self) -> &DenseNetBackbone {
        &self.backbone
    }

    pub fn head(&self) -> &TemporalHead {
        &self.head
    }

    pub fn init_report(&self) -> InitReport {
        self.init_report
    }

    pub fn summary(&self) -> Result<String> {
        let side = self.config.input_size;
        let mut s = String::new();
        s.push_str(&format!(
            "DenseNet-{} (growth {}, reduction {}, bottleneck {})\n",
            self.config.depth, self.config.growth_rate, self.config.reduction, self.config.bottleneck
        ));
        s.push_str(&"=".repeat(64));
        s.push('\n');
        s.push_str(&format!("{:28} {:24} {:>10}\n", "Layer", "Output Shape", "Params"));
        s.push_str(&"=".repeat(64));
        s.push('\n');
        s.push_str(&self.backbone.summary(&[1, 3, side, side])?);
        s.push_str(&self.head.summary());
        s.push_str(&"=".repeat(64));
        s.push('\n');
        s.push_str(&format!("Total params: {}\n", self.num_parameters()));
        Ok(s)
    }
}

impl Visit for DenseNet {
    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>)) {
        self.backbone.visit_mut(f);
        self.head.visit_mut(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemporalHeadConfig;
    use approx::assert_abs_diff_eq;

    fn tiny_config() -> DenseNetConfig {
        DenseNetConfig::new(4, 10, 0.5, 3, false)
            .with_input_size(8)
            .with_head(TemporalHeadConfig {
                hidden_dim: 6,
                num_layers: 2,
                repeats: 2,
                ..TemporalHeadConfig::default()
            })
            .with_seed(5)
    }

    fn image(n: usize, side: usize) -> Tensor {
        Tensor::from_vec(
            (0..n * 3 * side * side).map(|v| ((v * 7) % 13) as f32 / 13.0).collect(),
            &[n, 3, side, side],
        )
        .unwrap()
    }

    #[test]
    fn test_forward_produces_log_probabilities() {
        let mut model = DenseNet::new(tiny_config()).unwrap();
        let seed = model.init_hidden_starter(2);
        let output = model.forward(&image(2, 8), &seed, Mode::Training).unwrap();

        assert_eq!(output.shape(), &[2, 3]);
        for row in output.data().outer_iter() {
            assert!(row.iter().all(|v| *v <= 0.0));
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_inference_is_deterministic() {
        let mut model = DenseNet::new(tiny_config()).unwrap();
        let input = image(3, 8);

        let first = model.predict(&input).unwrap();
        let second = model.predict(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_same_seed_builds_same_model() {
        let mut a = DenseNet::new(tiny_config()).unwrap();
        let mut b = DenseNet::new(tiny_config()).unwrap();
        let input = image(1, 8);

        assert_eq!(a.predict(&input).unwrap(), b.predict(&input).unwrap());
    }

    #[test]
    fn test_init_report_counts_primitives() {
        let model = DenseNet::new(tiny_config()).unwrap();
        let report = model.init_report();

        // stem + 2 units x 3 groups + 2 transitions
        assert_eq!(report.convolutions, 9);
        // 2 units x 3 groups + 2 transitions + final bn; the head's flat bn is skipped
        assert_eq!(report.normalizations, 9);
        // two seed projections and the classifier
        assert_eq!(report.projections, 3);
    }

    #[test]
    fn test_hidden_starter_shape() {
        let model = DenseNet::new(tiny_config()).unwrap();
        let seed = model.init_hidden_starter(7);

        assert_eq!(seed.shape(), &[2, 7, 1]);
        assert!(seed.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let mut model = DenseNet::new(tiny_config()).unwrap();

        let wrong_seed = Tensor::zeros(&[3, 2, 1]);
        assert!(matches!(
            model.forward(&image(2, 8), &wrong_seed, Mode::Inference),
            Err(Error::ShapeMismatch { .. })
        ));

        let seed = model.init_hidden_starter(2);
        assert!(matches!(
            model.forward(&image(2, 16), &seed, Mode::Inference),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(matches!(
            DenseNet::new(tiny_config().with_depth(6)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            DenseNet::new(tiny_config().with_reduction(0.01)),
            Err(Error::InvalidConfig(_))
        ));
    }
}
