use crate::activations::Activation;
use crate::{Error, Result, Tensor};
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis, Ix3};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

use super::{Dropout, Mode};

// Gate rows are stacked (input, forget, cell, output), each `hidden` tall.
#[derive(Debug, Clone)]
struct LstmLayer {
    /// `(4 * hidden, input)`
    w_ih: Array2<f32>,
    /// `(4 * hidden, hidden)`
    w_hh: Array2<f32>,
    b_ih: Array1<f32>,
    b_hh: Array1<f32>,
}

impl LstmLayer {
    fn uniform<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let k = 1.0 / (hidden_size as f32).sqrt();
        let gates = 4 * hidden_size;
        Self {
            w_ih: Array2::random_using((gates, input_size), Uniform::new(-k, k), rng),
            w_hh: Array2::random_using((gates, hidden_size), Uniform::new(-k, k), rng),
            b_ih: Array1::random_using(gates, Uniform::new(-k, k), rng),
            b_hh: Array1::random_using(gates, Uniform::new(-k, k), rng),
        }
    }

    fn num_parameters(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.b_ih.len() + self.b_hh.len()
    }

    /// One cell update; returns `(h', c')`, each `(batch, hidden)`.
    fn cell(
        &self,
        x: ArrayView2<'_, f32>,
        h: ArrayView2<'_, f32>,
        c: ArrayView2<'_, f32>,
    ) -> (Array2<f32>, Array2<f32>) {
        let hidden = h.ncols();

        let mut gates = x.dot(&self.w_ih.t()) + h.dot(&self.w_hh.t());
        gates += &self.b_ih;
        gates += &self.b_hh;

        let mut input_gate = gates.slice(s![.., 0..hidden]).to_owned();
        let mut forget_gate = gates.slice(s![.., hidden..2 * hidden]).to_owned();
        let mut candidate = gates.slice(s![.., 2 * hidden..3 * hidden]).to_owned();
        let mut output_gate = gates.slice(s![.., 3 * hidden..]).to_owned();

        Activation::Sigmoid.apply_array(&mut input_gate);
        Activation::Sigmoid.apply_array(&mut forget_gate);
        Activation::Tanh.apply_array(&mut candidate);
        Activation::Sigmoid.apply_array(&mut output_gate);

        let c_next = forget_gate * &c + input_gate * candidate;
        let mut h_next = c_next.clone();
        Activation::Tanh.apply_array(&mut h_next);
        h_next *= &output_gate;

        (h_next, c_next)
    }
}

/// Hidden and cell state of a stacked LSTM, each `(layers, batch, hidden)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmState {
    pub h: Array3<f32>,
    pub c: Array3<f32>,
}

impl LstmState {
    pub fn zeros(num_layers: usize, batch_size: usize, hidden_size: usize) -> Self {
        Self {
            h: Array3::zeros((num_layers, batch_size, hidden_size)),
            c: Array3::zeros((num_layers, batch_size, hidden_size)),
        }
    }

    pub fn from_tensors(h: Tensor, c: Tensor) -> Result<Self> {
        if h.shape() != c.shape() {
            return Err(Error::ShapeMismatch {
                expected: h.shape().to_vec(),
                actual: c.shape().to_vec(),
            });
        }

        let to_3d = |t: Tensor| {
            t.into_data()
                .into_dimensionality::<Ix3>()
                .map_err(|e| Error::Layer(format!("LSTM state must be 3D: {}", e)))
        };

        Ok(Self {
            h: to_3d(h)?,
            c: to_3d(c)?,
        })
    }

    /// `h` of the last layer, `(batch, hidden)`.
    pub fn top_hidden(&self) -> Array2<f32> {
        let last = self.h.len_of(Axis(0)).saturating_sub(1);
        self.h.index_axis(Axis(0), last).to_owned()
    }
}

/// Stacked LSTM with PyTorch gate layout and inter-layer dropout.
#[derive(Debug, Clone)]
pub struct Lstm {
    name: String,
    input_size: usize,
    hidden_size: usize,
    layers: Vec<LstmLayer>,
    dropout: Dropout,
}

impl Lstm {
    /// All weights and biases drawn from U(-1/sqrt(hidden), 1/sqrt(hidden)).
    pub fn new<R: Rng>(
        name: String,
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f32,
        rng: &mut R,
    ) -> Result<Self> {
        if input_size == 0 || hidden_size == 0 || num_layers == 0 {
            return Err(Error::Layer(format!(
                "{}: input {}, hidden {} and layers {} must all be positive",
                name, input_size, hidden_size, num_layers
            )));
        }

        let layers = (0..num_layers)
            .map(|l| {
                let layer_input = if l == 0 { input_size } else { hidden_size };
                LstmLayer::uniform(layer_input, hidden_size, rng)
            })
            .collect();

        let dropout = Dropout::new(format!("{}_dropout", name), dropout, rng.gen())?;

        Ok(Self {
            name,
            input_size,
            hidden_size,
            layers,
            dropout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(LstmLayer::num_parameters).sum()
    }

    fn check_state(&self, state: &LstmState, batch_size: usize) -> Result<()> {
        let expected = [self.num_layers(), batch_size, self.hidden_size];
        for part in [&state.h, &state.c] {
            if part.shape() != &expected[..] {
                return Err(Error::ShapeMismatch {
                    expected: expected.to_vec(),
                    actual: part.shape().to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Advances every layer by one time step. `x` is `(batch, input_size)`.
    pub fn step(&mut self, x: ArrayView2<'_, f32>, state: LstmState, mode: Mode) -> Result<LstmState> {
        let (batch_size, features) = x.dim();
        if features != self.input_size {
            return Err(Error::ShapeMismatch {
                expected: vec![self.input_size],
                actual: vec![features],
            });
        }
        self.check_state(&state, batch_size)?;

        let mut next = LstmState::zeros(self.num_layers(), batch_size, self.hidden_size);
        let mut layer_input = x.to_owned();

        for (l, layer) in self.layers.iter().enumerate() {
            let (h, c) = layer.cell(
                layer_input.view(),
                state.h.index_axis(Axis(0), l),
                state.c.index_axis(Axis(0), l),
            );
            next.h.index_axis_mut(Axis(0), l).assign(&h);
            next.c.index_axis_mut(Axis(0), l).assign(&c);

            layer_input = h;
            if l + 1 < self.layers.len() {
                self.dropout.apply_inplace(&mut layer_input, mode);
            }
        }

        Ok(next)
    }

    /// Runs a `(seq_len, batch, input_size)` sequence, returning the top-layer
    /// output for every step `(seq_len, batch, hidden)` and the final state.
    pub fn forward(
        &mut self,
        input: &Tensor,
        state: LstmState,
        mode: Mode,
    ) -> Result<(Tensor, LstmState)> {
        let sequence = input
            .data()
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|_| {
                Error::Layer(format!(
                    "{} expects 3D (seq, batch, features) input, got {:?}",
                    self.name,
                    input.shape()
                ))
            })?;

        let (seq_len, batch_size, _) = sequence.dim();
        let mut outputs = Array3::zeros((seq_len, batch_size, self.hidden_size));
        let mut state = state;

        for (t, x_t) in sequence.outer_iter().enumerate() {
            state = self.step(x_t, state, mode)?;
            outputs.index_axis_mut(Axis(0), t).assign(&state.top_hidden());
        }

        Ok((Tensor::new(outputs.into_dyn()), state))
    }
}
