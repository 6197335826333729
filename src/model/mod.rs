pub mod backbone;
pub mod config;
pub mod dense_unit;
pub mod densenet;
pub mod head;
pub mod sequential;
pub mod transition;

pub use backbone::{DenseNetBackbone, StageChannels};
pub use config::{DenseNetConfig, TemporalHeadConfig};
pub use dense_unit::DenseUnit;
pub use densenet::DenseNet;
pub use head::TemporalHead;
pub use sequential::Sequential;
pub use transition::Transition;

use crate::{
    activations::Activation,
    layers::{BatchNorm, Layer, Mode},
    Result, Tensor,
};

/// Pre-activation used throughout DenseNet: batch norm followed by ReLU.
pub(crate) fn norm_relu(bn: &mut BatchNorm, input: &Tensor, mode: Mode) -> Result<Tensor> {
    let mut out = bn.forward(input, mode)?;
    Activation::ReLU.apply(&mut out)?;
    Ok(out)
}
