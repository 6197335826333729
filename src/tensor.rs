use ndarray::{Array, ArrayD, ArrayViewD, Axis, IxDyn};

use crate::{Error, Result};

/// Owned n-dimensional `f32` array flowing between layers.
///
/// Image tensors use NCHW layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    pub fn from_vec(vec: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != vec.len() {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![vec.len()],
            });
        }

        let data = Array::from_shape_vec(IxDyn(shape), vec)
            .map_err(|e| Error::Layer(format!("Tensor construction failed: {}", e)))?;
        Ok(Self { data })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn into_data(self) -> ArrayD<f32> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn reshape(&self, new_shape: &[usize]) -> Result<Self> {
        self.clone().into_reshape(new_shape)
    }

    pub fn into_reshape(self, new_shape: &[usize]) -> Result<Self> {
        let total_elements: usize = new_shape.iter().product();
        if total_elements != self.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![total_elements],
                actual: vec![self.len()],
            });
        }

        let data = self
            .data
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(new_shape))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;
        Ok(Self { data })
    }

    /// Joins tensors along `axis`. Every other dimension must agree.
    pub fn concat(tensors: &[&Tensor], axis: usize) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| Error::Layer("Cannot concatenate zero tensors".to_string()))?;

        if axis >= first.ndim() {
            return Err(Error::Layer(format!(
                "Concat axis {} out of range for rank {}",
                axis,
                first.ndim()
            )));
        }

        for t in &tensors[1..] {
            let compatible = t.ndim() == first.ndim()
                && t
                    .shape()
                    .iter()
                    .zip(first.shape())
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(Error::ShapeMismatch {
                    expected: first.shape().to_vec(),
                    actual: t.shape().to_vec(),
                });
            }
        }

        let views: Vec<ArrayViewD<'_, f32>> = tensors.iter().map(|t| t.data.view()).collect();
        let data = ndarray::concatenate(Axis(axis), &views)
            .map_err(|e| Error::Layer(format!("Concat failed: {}", e)))?;
        Ok(Self { data })
    }

    /// Drops a length-1 axis.
    pub fn squeeze_axis(self, axis: usize) -> Result<Self> {
        match self.shape().get(axis) {
            Some(1) => Ok(Self {
                data: self.data.index_axis_move(Axis(axis), 0),
            }),
            _ => Err(Error::Layer(format!(
                "Cannot squeeze axis {} of shape {:?}",
                axis,
                self.shape()
            ))),
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(data: ArrayD<f32>) -> Self {
        Self::new(data)
    }
}

impl AsRef<ArrayD<f32>> for Tensor {
    fn as_ref(&self) -> &ArrayD<f32> {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_channels() {
        let a = Tensor::from_vec(vec![1.0, 2.0], &[1, 1, 1, 2]).unwrap();
        let b = Tensor::from_vec(vec![3.0, 4.0, 5.0, 6.0], &[1, 2, 1, 2]).unwrap();

        let out = Tensor::concat(&[&a, &b], 1).unwrap();

        assert_eq!(out.shape(), &[1, 3, 1, 2]);
        assert_eq!(out.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_concat_rejects_mismatched_spatial() {
        let a = Tensor::zeros(&[1, 1, 2, 2]);
        let b = Tensor::zeros(&[1, 1, 3, 2]);

        assert!(Tensor::concat(&[&a, &b], 1).is_err());
    }

    #[test]
    fn test_squeeze_axis() {
        let t = Tensor::zeros(&[1, 4, 3]);
        assert_eq!(t.clone().squeeze_axis(0).unwrap().shape(), &[4, 3]);
        assert!(t.squeeze_axis(1).is_err());
    }
}
