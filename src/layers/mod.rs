pub mod batch_normalization;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod lstm;
pub mod pooling;

use crate::{init::LayerKind, Result, Tensor};

/// Whether a forward call is part of training or inference.
///
/// Dropout is only active in `Training`; batch normalization uses batch
/// statistics (and updates its running estimates) in `Training` and the
/// running estimates in `Inference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Training,
    Inference,
}

impl Mode {
    pub fn is_training(self) -> bool {
        matches!(self, Mode::Training)
    }
}

pub trait Layer: std::fmt::Debug + Send + Sync {
    fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor>;
    fn name(&self) -> &str;
    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>>;

    fn num_parameters(&self) -> usize {
        0
    }

    /// Hands every initializable primitive owned by this layer to `f`.
    fn visit_mut(&mut self, _f: &mut dyn FnMut(LayerKind<'_>)) {}
}

pub use batch_normalization::{BatchNorm, NormDims};
pub use conv2d::Conv2D;
pub use dense::Dense;
pub use dropout::Dropout;
pub use lstm::{Lstm, LstmState};
pub use pooling::AveragePooling2D;

/// Splits an NCHW shape, rejecting other ranks.
pub(crate) fn nchw(layer: &str, shape: &[usize]) -> Result<(usize, usize, usize, usize)> {
    match *shape {
        [n, c, h, w] => Ok((n, c, h, w)),
        _ => Err(crate::Error::Layer(format!(
            "{} expects 4D (N, C, H, W) input, got {:?}",
            layer, shape
        ))),
    }
}
