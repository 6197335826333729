use crate::{
    init::LayerKind,
    layers::{Layer, Mode},
    Error, Result, Tensor,
};

/// Ordered chain of layers; each consumes the previous layer's output.
#[derive(Debug)]
pub struct Sequential {
    name: String,
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    pub fn new(name: String) -> Self {
        Self {
            name,
            layers: Vec::new(),
        }
    }

    pub fn add(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }
}

impl Layer for Sequential {
    fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor> {
        let mut current = input.clone();

        for (idx, layer) in self.layers.iter_mut().enumerate() {
            current = layer.forward(&current, mode).map_err(|e| match e {
                Error::Layer(msg) => {
                    Error::Layer(format!("Layer {} ({}): {}", idx, layer.name(), msg))
                }
                other => {
                    log::debug!("{}: layer {} ({}) failed: {}", self.name, idx, layer.name(), other);
                    other
                }
            })?;
        }

        Ok(current)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        let mut current_shape = input_shape.to_vec();

        for layer in &self.layers {
            current_shape = layer.output_shape(&current_shape)?;
        }

        Ok(current_shape)
    }

    fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.num_parameters()).sum()
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>)) {
        for layer in &mut self.layers {
            layer.visit_mut(f);
        }
    }
}
