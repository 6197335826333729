//! # DenseNet-LSTM
//!
//! A DenseNet convolutional feature extractor whose pooled features drive a
//! stacked LSTM head, producing per-class log-probabilities.
//!
//! ## Example
//!
//! ```rust,no_run
//! use densenet_lstm::{DenseNet, DenseNetConfig, Tensor};
//!
//! let mut model = DenseNet::new(DenseNetConfig::new(12, 40, 1.0, 10, false))?;
//! let images = Tensor::zeros(&[4, 3, 32, 32]);
//! let log_probs = model.predict(&images)?;
//! assert_eq!(log_probs.shape(), &[4, 10]);
//! # Ok::<(), densenet_lstm::Error>(())
//! ```

pub mod activations;
mod conv2d_impl;
pub mod error;
pub mod init;
pub mod layers;
pub mod model;
pub mod tensor;

#[cfg(feature = "python")]
pub mod python;

pub use error::{Error, Result};
pub use layers::Mode;
pub use model::{DenseNet, DenseNetConfig, TemporalHeadConfig};
pub use tensor::Tensor;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn densenet_lstm(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register_module(m)?;
    Ok(())
}
