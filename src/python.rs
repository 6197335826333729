use ndarray::ArrayD;
use numpy::{PyArray, PyArrayDyn, PyArrayMethods};
use pyo3::prelude::*;

use crate::{DenseNet as RustDenseNet, DenseNetConfig, Mode, Tensor};

fn runtime_error(context: &str, e: crate::Error) -> PyErr {
    pyo3::exceptions::PyRuntimeError::new_err(format!("{}: {}", context, e))
}

#[pyclass(name = "DenseNet")]
pub struct PyDenseNet {
    inner: RustDenseNet,
}

#[pymethods]
impl PyDenseNet {
    #[new]
    #[pyo3(signature = (growth_rate, depth, reduction, n_classes, bottleneck, seed=None))]
    fn new(
        growth_rate: usize,
        depth: usize,
        reduction: f64,
        n_classes: usize,
        bottleneck: bool,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        let mut config = DenseNetConfig::new(growth_rate, depth, reduction, n_classes, bottleneck);
        config.seed = seed;

        let model = RustDenseNet::new(config)
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(format!("Invalid model: {}", e)))?;
        Ok(Self { inner: model })
    }

    #[staticmethod]
    #[pyo3(signature = (path))]
    fn from_config(path: &str) -> PyResult<Self> {
        let config = DenseNetConfig::from_json_file(path)
            .map_err(|e| runtime_error("Failed to read config", e))?;
        let model = RustDenseNet::new(config)
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(format!("Invalid model: {}", e)))?;
        Ok(Self { inner: model })
    }

    fn init_hidden_starter<'py>(&self, py: Python<'py>, batch_size: usize) -> Bound<'py, PyArrayDyn<f32>> {
        PyArray::from_owned_array(py, self.inner.init_hidden_starter(batch_size).into_data())
    }

    #[pyo3(signature = (input, hidden_starter, training=false))]
    fn forward<'py>(
        &mut self,
        py: Python<'py>,
        input: &Bound<'py, PyArrayDyn<f32>>,
        hidden_starter: &Bound<'py, PyArrayDyn<f32>>,
        training: bool,
    ) -> PyResult<Bound<'py, PyArrayDyn<f32>>> {
        let input_array: ArrayD<f32> = input.readonly().as_array().to_owned();
        let starter_array: ArrayD<f32> = hidden_starter.readonly().as_array().to_owned();
        let mode = if training { Mode::Training } else { Mode::Inference };

        let output = self
            .inner
            .forward(&Tensor::new(input_array), &Tensor::new(starter_array), mode)
            .map_err(|e| runtime_error("Forward failed", e))?;

        Ok(PyArray::from_owned_array(py, output.into_data()))
    }

    fn predict<'py>(
        &mut self,
        py: Python<'py>,
        input: &Bound<'py, PyArrayDyn<f32>>,
    ) -> PyResult<Bound<'py, PyArrayDyn<f32>>> {
        let input_array: ArrayD<f32> = input.readonly().as_array().to_owned();

        let output = self
            .inner
            .predict(&Tensor::new(input_array))
            .map_err(|e| runtime_error("Prediction failed", e))?;

        Ok(PyArray::from_owned_array(py, output.into_data()))
    }

    fn summary(&self) -> PyResult<String> {
        self.inner
            .summary()
            .map_err(|e| runtime_error("Summary failed", e))
    }

    #[pyo3(signature = ())]
    fn num_parameters(&self) -> usize {
        self.inner.num_parameters()
    }

    fn __repr__(&self) -> String {
        let config = self.inner.config();
        format!(
            "<DenseNet depth={} growth_rate={} n_classes={}>",
            config.depth, config.growth_rate, config.n_classes
        )
    }

    fn __str__(&self) -> PyResult<String> {
        self.summary()
    }
}

pub fn register_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDenseNet>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
