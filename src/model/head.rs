use ndarray::Ix2;
use rand::Rng;

use super::TemporalHeadConfig;
use crate::{
    activations::Activation,
    init::{LayerKind, Visit},
    layers::{BatchNorm, Dense, Dropout, Layer, Lstm, LstmState, Mode},
    Error, Result, Tensor,
};

/// Applies `step` to `initial` exactly `times` times, feeding each result
/// back in, and returns the last state.
pub fn refine<S, F>(initial: S, times: usize, mut step: F) -> Result<S>
where
    F: FnMut(S) -> Result<S>,
{
    (0..times).try_fold(initial, |state, _| step(state))
}

/// Recurrent classification head.
///
/// The pooled backbone features form a single time step. The stacked LSTM is
/// applied `repeats` times to that same step, each pass starting from the
/// state left by the previous one; the top layer's final hidden state is then
/// normalized, dropped out, projected to class scores and log-softmaxed.
#[derive(Debug)]
pub struct TemporalHead {
    h0_proj: Dense,
    c0_proj: Dense,
    lstm: Lstm,
    bn: BatchNorm,
    dropout: Dropout,
    classifier: Dense,
    repeats: usize,
}

impl TemporalHead {
    pub fn new<R: Rng>(
        config: &TemporalHeadConfig,
        in_channels: usize,
        n_classes: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let hidden = config.hidden_dim;

        log::debug!(
            "head: lstm {} -> {} x {} layers, {} repeats, {} classes",
            in_channels,
            hidden,
            config.num_layers,
            config.repeats,
            n_classes
        );

        Ok(Self {
            h0_proj: Dense::uniform("hidden_init_fc1".to_string(), 1, hidden, rng)?,
            c0_proj: Dense::uniform("hidden_init_fc2".to_string(), 1, hidden, rng)?,
            lstm: Lstm::new(
                "lstm".to_string(),
                in_channels,
                hidden,
                config.num_layers,
                config.lstm_dropout,
                rng,
            )?,
            bn: BatchNorm::flat("bn2".to_string(), hidden),
            dropout: Dropout::new("dropout".to_string(), config.dropout, rng.gen())?,
            classifier: Dense::uniform("fc2".to_string(), hidden, n_classes, rng)?,
            repeats: config.repeats,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.lstm.hidden_size()
    }

    pub fn num_layers(&self) -> usize {
        self.lstm.num_layers()
    }

    pub fn repeats(&self) -> usize {
        self.repeats
    }

    pub fn lstm(&self) -> &Lstm {
        &self.lstm
    }

    /// Initial LSTM state projected from a `(layers, batch, 1)` seed.
    pub fn initial_state(&mut self, seed: &Tensor, batch_size: usize) -> Result<LstmState> {
        let expected = [self.num_layers(), batch_size, 1];
        if seed.shape() != &expected[..] {
            return Err(Error::ShapeMismatch {
                expected: expected.to_vec(),
                actual: seed.shape().to_vec(),
            });
        }

        let h0 = self.h0_proj.forward(seed, Mode::Inference)?;
        let c0 = self.c0_proj.forward(seed, Mode::Inference)?;
        LstmState::from_tensors(h0, c0)
    }

    /// `features` is the pooled `(N, C, 1, 1)` backbone output; returns
    /// `(N, n_classes)` log-probabilities.
    pub fn forward(&mut self, features: &Tensor, seed: &Tensor, mode: Mode) -> Result<Tensor> {
        let (batch_size, channels) = match *features.shape() {
            [n, c, 1, 1] => (n, c),
            [n, c, ..] => {
                return Err(Error::ShapeMismatch {
                    expected: vec![n, c, 1, 1],
                    actual: features.shape().to_vec(),
                })
            }
            _ => {
                return Err(Error::Layer(format!(
                    "head expects pooled (N, C, 1, 1) features, got {:?}",
                    features.shape()
                )))
            }
        };

        // The batch becomes the LSTM batch of a length-1 sequence.
        let step_input = features
            .reshape(&[batch_size, channels])?
            .into_data()
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        let initial = self.initial_state(seed, batch_size)?;
        let lstm = &mut self.lstm;
        let state = refine(initial, self.repeats, |state| {
            lstm.step(step_input.view(), state, mode)
        })?;

        let out = Tensor::new(state.top_hidden().into_dyn());
        let out = self.bn.forward(&out, mode)?;
        let out = self.dropout.forward(&out, mode)?;
        let mut out = self.classifier.forward(&out, mode)?;
        Activation::LogSoftmax.apply(&mut out)?;

        Ok(out)
    }

    pub fn num_parameters(&self) -> usize {
        self.h0_proj.num_parameters()
            + self.c0_proj.num_parameters()
            + self.lstm.num_parameters()
            + self.bn.num_parameters()
            + self.classifier.num_parameters()
    }

    pub fn summary(&self) -> String {
        let hidden = self.hidden_dim();
        let rows = [
            ("hidden_init x2", format!("[{}, N, {}]", self.num_layers(), hidden), self.h0_proj.num_parameters() * 2),
            (self.lstm.name(), format!("[N, {}] x{}", hidden, self.repeats), self.lstm.num_parameters()),
            (self.bn.name(), format!("[N, {}]", hidden), self.bn.num_parameters()),
            (self.classifier.name(), format!("[N, {}]", self.classifier.units()), self.classifier.num_parameters()),
        ];

        rows.iter()
            .map(|(name, shape, params)| format!("{:28} {:24} {:>10}\n", name, shape, params))
            .collect()
    }
}

impl Visit for TemporalHead {
    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>)) {
        self.h0_proj.visit_mut(f);
        self.c0_proj.visit_mut(f);
        self.bn.visit_mut(f);
        self.classifier.visit_mut(f);
    }
}
